//! Headless client for a notebook cell execution backend.
//!
//! The backend runs sql and python cells asynchronously: a cell is
//! submitted to `POST /api/execute`, which returns a task id, and the
//! result is fetched by polling `GET /api/result/{task_id}` until the task
//! reports ready. This crate models that lifecycle ([`runner`]), the wire
//! contract ([`api`], [`client`]), and the `.ngnb` notebook documents the
//! cells live in ([`notebook`], [`export`]). The `nbrun` binary wraps it
//! all in a CLI ([`cli`]).

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod export;
pub mod notebook;
pub mod runner;
