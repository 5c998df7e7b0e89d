//! Modules layer - adapters for the hosted backend
//!
//! Everything that talks to the auth provider or the document database sits
//! behind the traits in `backend`.

pub mod backend;
