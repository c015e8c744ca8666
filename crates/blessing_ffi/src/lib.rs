//! Flutter-facing bindings of the blessing core.

pub mod api;
