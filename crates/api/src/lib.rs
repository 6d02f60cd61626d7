//! HTTP surface of the notification core: template administration, ad-hoc
//! sends and supplier-SMS enqueueing behind the subscription gate.

pub mod middleware;
pub mod routes;
pub mod state;
