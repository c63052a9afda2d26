// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # typeforge
//!
//! A pipeline that generates subclasses ("proxies") of requested types at runtime. Pluggable
//! participants decide what each generated type contains: they override virtual methods,
//! add fields, interfaces, custom attributes and initialization code, and may generate
//! additional helper types. Generated types are cached per request, can be created from
//! many threads at once, and can be flushed to disk and loaded back in a later process.
//!
//! ## Features
//!
//! - **🧩 Participants** - Ordered, independent extension points editing one batch of descriptors
//! - **🔑 Request identity** - Every generated type carries the identifier it was built for
//! - **⚡ Lock-free cache hits** - Only misses enter the code generation section
//! - **🔁 Re-entrant generation** - Participants may request further types while generating
//! - **💾 Persistence** - Generated modules are flushed to disk and reloaded without regeneration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typeforge::prelude::*;
//!
//! struct Greeter;
//!
//! impl Participant for Greeter {
//!     fn name(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     fn participate(
//!         &self,
//!         _state: &mut ParticipantState,
//!         context: &mut ProxyTypeAssemblyContext<'_>,
//!     ) -> typeforge::Result<()> {
//!         let greet = context.requested_type().method("Greet")?;
//!         let proxy = context.proxy_mut()?;
//!         let (method, _) = proxy.get_or_add_override(&greet)?;
//!         proxy.set_method_body(method, Expr::constant("hello"))
//!     }
//! }
//!
//! let registry = Arc::new(TypeRegistry::new()?);
//! let base = ClassBuilder::new("App", "Base")
//!     .public()
//!     .default_constructor()
//!     .method("Greet", |m| {
//!         m.virtual_().returns(TypeSignature::String).body(Expr::constant("base"))
//!     })
//!     .build(&registry)?;
//!
//! let pipeline = Pipeline::builder(registry)
//!     .participant(Arc::new(Greeter))
//!     .build()?;
//! let instance = pipeline.create(&base, &[])?;
//! assert_eq!(instance.call("Greet", &[])?.as_str(), Some("hello"));
//! # Ok::<(), typeforge::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`runtime`] - The type system generated types live in, with an interpreter for bodies
//! - [`model`] - Mutable descriptors participants edit
//! - [`identity`] - Request identifiers
//! - [`assembler`] - Participants and the per-request orchestration
//! - [`codegen`] - Turning descriptor batches into runtime types, and module persistence
//! - [`sync`] / [`cache`] - Concurrency control and the caches built on it
//! - [`pipeline`] - The public facade
//! - [`Error`] and [`Result`] - Error handling

#[macro_use]
pub(crate) mod error;
pub(crate) mod utils;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use typeforge::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::new()?);
/// let pipeline = Pipeline::builder(registry).build()?;
/// println!("{}", pipeline.participant_configuration_id());
/// # Ok::<(), typeforge::Error>(())
/// ```
pub mod prelude;

pub mod assembler;
pub mod cache;
pub mod codegen;
pub mod identity;
pub mod model;
pub mod pipeline;
pub mod runtime;
pub mod sync;

/// `typeforge` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `typeforge` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use typeforge::{runtime::TypeRegistry, Error, Pipeline};
///
/// # fn requested() -> typeforge::runtime::TypeRc { unimplemented!() }
/// let pipeline = Pipeline::builder(Arc::new(TypeRegistry::new()?)).build()?;
/// match pipeline.create(&requested(), &[]) {
///     Ok(instance) => println!("Created {}", instance.runtime_type().fullname()),
///     Err(Error::TypeAssembly { message, .. }) => println!("Generation failed: {message}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// # Ok::<(), typeforge::Error>(())
/// ```
pub use error::Error;

/// The pipeline facade and its configuration.
///
/// See [`pipeline::Pipeline`] for creating instances of generated types.
pub use pipeline::{CodeManager, Pipeline, PipelineBuilder, PipelineSettings, ReflectionService};
