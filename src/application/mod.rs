//! Application Layer
//!
//! The chat logic and the inputs it accepts. Callers (a GraphQL or REST
//! layer) authenticate the actor and pass it in; this layer enforces
//! membership and state rules on top of the domain stores.

pub mod dto;
pub mod services;
