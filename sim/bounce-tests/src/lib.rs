//! Integration tests for the bounce workspace live in `integration/`.
