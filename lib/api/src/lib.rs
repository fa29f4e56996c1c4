pub mod rest;

pub use rest::{projection_routes, reference_routes, router_routes, RestApi};
