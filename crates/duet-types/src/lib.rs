//! Wire types shared by the REST layer, the realtime gateway and the server
//! binary.

pub mod api;
pub mod events;
pub mod models;
