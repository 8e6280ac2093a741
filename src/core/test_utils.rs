//! Test utilities for arena-based testing.
//!
//! Each test gets its own arena and session, so statistics never leak from
//! one test into another.
