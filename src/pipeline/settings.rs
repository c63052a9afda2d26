//! Pipeline configuration.

use std::{num::NonZeroUsize, path::PathBuf, thread};

use crate::{codegen::MODULE_COUNTER_PLACEHOLDER, Error, Result};

/// Configuration of a [`crate::Pipeline`]
///
/// All settings are fixed once the pipeline is created. Generated code of pipelines with
/// different participant configuration ids is not interchangeable; flushed modules carry
/// the id and are only loaded by a pipeline with the same one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Identifies the participant configuration (default: `"default"`)
    pub participant_configuration_id: String,

    /// Directory flushed modules are written to; `None` uses the current directory
    pub assembly_directory: Option<PathBuf>,

    /// Name pattern of generated modules; must contain the `{counter}` placeholder
    /// (default: `"TypeForge.Generated.{counter}"`)
    pub module_name_pattern: String,

    /// Number of module contexts, and so the number of modules generated into concurrently
    /// (default: available parallelism)
    pub degree_of_parallelism: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            participant_configuration_id: "default".to_string(),
            assembly_directory: None,
            module_name_pattern: format!("TypeForge.Generated.{MODULE_COUNTER_PLACEHOLDER}"),
            degree_of_parallelism: thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

impl PipelineSettings {
    /// Settings generating into a single module context, for deterministic module names
    #[must_use]
    pub fn single_threaded() -> Self {
        Self {
            degree_of_parallelism: 1,
            ..Self::default()
        }
    }

    /// Checks the settings for consistency
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty configuration id, a pattern without the
    /// counter placeholder or a degree of parallelism of zero.
    pub fn validate(&self) -> Result<()> {
        if self.participant_configuration_id.is_empty() {
            return Err(Error::Configuration(
                "Participant configuration id must not be empty".to_string(),
            ));
        }
        if !self.module_name_pattern.contains(MODULE_COUNTER_PLACEHOLDER) {
            return Err(Error::Configuration(format!(
                "Module name pattern '{}' must contain the placeholder '{}'",
                self.module_name_pattern, MODULE_COUNTER_PLACEHOLDER
            )));
        }
        if self.degree_of_parallelism == 0 {
            return Err(Error::Configuration(
                "Degree of parallelism must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
