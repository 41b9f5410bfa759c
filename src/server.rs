//! Defines the HTTP front ends for both node roles.
//!
//! Each role builds an explicit handler registry --- an axum [`Router`] with
//! one route per wire endpoint, every handler a closure over the node
//! instance held in the router state. Success responses are `200` with
//! `application/octet-stream` bodies (`/snap` uses `application/gzip`);
//! errors map to `400 text/plain` carrying the kind message, except host I/O
//! failures, which are `500`.

mod data;
mod name;

pub use data::data_node_router;
pub use name::name_node_router;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::{Error, Result};

const OCTET_STREAM: &str = "application/octet-stream";
const GZIP: &str = "application/gzip";
const TEXT: &str = "text/plain";

fn reply(result: Result<Vec<u8>>) -> Response {
    reply_as(OCTET_STREAM, result)
}

fn reply_as(content_type: &'static str, result: Result<Vec<u8>>) -> Response {
    match result {
        Ok(body) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(err) => reply_error(err),
    }
}

fn reply_error(err: Error) -> Response {
    let status = match err {
        Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, [(header::CONTENT_TYPE, TEXT)], err.to_string()).into_response()
}
