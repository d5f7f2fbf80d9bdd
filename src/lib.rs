//! Lead API Library
//!
//! A small CRUD backend for sales leads behind a JSON REST API. Requests are
//! resolved by a priority-ranked route table so literal routes such as
//! `/api/v1/leads/search/` are never shadowed by `/api/v1/leads/{lead_id}`.
//!
//! # Modules
//!
//! - `app`: axum application assembly (dispatcher plus middleware).
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and the route table.
//! - `memory_repo`: In-memory lead store.
//! - `models`: Lead data models.
//! - `repository`: Lead storage trait and PostgreSQL implementation.
//! - `routing`: Priority-ranked route resolution.
//! - `validation`: Lead input validation.

pub mod app;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod memory_repo;
pub mod models;
pub mod repository;
pub mod routing;
pub mod validation;
