#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! In-process x402 facilitator.
//!
//! [`FacilitatorLocal`] routes verify and settle requests to the scheme
//! handlers of a [`SchemeRegistry`](x402_types::scheme::SchemeRegistry), and
//! [`handlers::routes`] serves it over HTTP.
//!
//! ```ignore
//! use std::sync::Arc;
//! use x402_facilitator_local::{FacilitatorLocal, handlers};
//!
//! let scheme_registry = SchemeRegistry::build(&chain_registry, scheme_blueprints);
//! let state = Arc::new(FacilitatorLocal::new(scheme_registry));
//! let app = axum::Router::new().merge(handlers::routes().with_state(state));
//! axum::serve(listener, app).await?;
//! ```

pub mod facilitator_local;
pub mod handlers;
pub mod util;

pub use facilitator_local::*;
pub use handlers::*;
