//! API routes and handlers

pub mod admin;
pub mod internal;
pub mod openai;
mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use router::create_router;
