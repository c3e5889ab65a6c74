//! Routing plan generation.
//!
//! A [`RoutingIntent`] is folded, together with the services, endpoints and
//! TLS secrets it references, into a [`RoutingPlan`] for the proxy:
//!
//! ```text
//! [ Rule ] -> [ Path ] -> [ Split ] -> [ Service + Endpoints ] -> [ Cluster ]
//!                \-> [ Route ] <------------------------------------/
//! [ Rule ] -> [ VirtualHost (external) ] + [ VirtualHost (internal) ]
//! ```
//!
//! Translation is all-or-nothing for an intent. TLS secrets that cannot be
//! read and rules left without routes fail the whole intent. Splits whose
//! backends cannot be resolved are handled according to the configured
//! [`SplitFailurePolicy`].

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod split;
mod translate;


pub use self::{
    split::{SplitError, SplitFailurePolicy},
    translate::{IngressTranslator, TranslateError, CLUSTER_CONNECT_TIMEOUT},
};
pub use kourier_controller_core::{RoutingIntent, RoutingPlan};
