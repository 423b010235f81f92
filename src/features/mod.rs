//! Feature transforms that can be bound into pipeline stages.
//!
//! Every transform kind is a typed configuration struct implementing
//! [`Transform`]. Arguments are exposed by name so a stage can be built from a
//! JSON argument map and tuned later; unknown names are rejected with
//! [`PipelineError::ArgumentMismatch`] at the moment they are assigned.

mod amplitude;
mod mel;
mod reshape;

use std::fmt::Debug;

pub use amplitude::{LogAmplitude, Reference};
pub use mel::MelSpectrogram;
pub use reshape::{Transpose, VerticalStack};

use crate::error::{PipelineError, Result};
use crate::params::{ParamValue, Params};
use crate::types::StageData;

/// Function names understood by [`transform_from_arguments`].
pub const FUNCTIONS: &[&str] = &[
    MelSpectrogram::NAME,
    LogAmplitude::NAME,
    Transpose::NAME,
    VerticalStack::NAME,
];

/// A pure array-to-array function with named, typed arguments.
pub trait Transform: Debug + Send + Sync {
    /// Function name used in pipeline specs and error messages.
    fn name(&self) -> &'static str;

    fn accepted_arguments(&self) -> &'static [&'static str];

    /// Current value of every accepted argument.
    fn arguments(&self) -> Params;

    /// Type-checks and stores one argument without cross-argument validation.
    fn assign(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Checks the argument set as a whole.
    fn validate(&self) -> Result<()>;

    /// Applies the function to the whole input.
    fn apply(&self, input: StageData) -> Result<StageData>;

    fn box_clone(&self) -> Box<dyn Transform>;
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Resolves `function` and binds `arguments` to it, failing on any argument
/// the function does not accept.
pub fn transform_from_arguments(function: &str, arguments: &Params) -> Result<Box<dyn Transform>> {
    let mut transform: Box<dyn Transform> = match function {
        MelSpectrogram::NAME => Box::new(MelSpectrogram::default()),
        LogAmplitude::NAME => Box::new(LogAmplitude::default()),
        Transpose::NAME => Box::new(Transpose),
        VerticalStack::NAME => Box::new(VerticalStack),
        other => return Err(PipelineError::UnknownFunction(other.to_string())),
    };
    for (name, value) in arguments {
        transform.assign(name, value)?;
    }
    transform.validate()?;
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::params;

    #[test]
    fn builds_every_registered_function_with_defaults() {
        for function in FUNCTIONS {
            let transform = transform_from_arguments(function, &Params::new()).unwrap();
            assert_eq!(transform.name(), *function);
            let arguments = transform.arguments();
            let mut names: Vec<&str> = arguments.keys().map(String::as_str).collect();
            let mut accepted = transform.accepted_arguments().to_vec();
            names.sort_unstable();
            accepted.sort_unstable();
            assert_eq!(names, accepted, "argument names of {function}");
        }
    }

    #[test]
    fn rejects_unknown_function() {
        let err = transform_from_arguments("stft", &Params::new()).unwrap_err();
        assert_eq!(err, PipelineError::UnknownFunction("stft".into()));
    }

    #[test]
    fn rejects_argument_outside_signature() {
        let arguments = params([("n_fft", 1024usize)]);
        let err = transform_from_arguments("transpose", &arguments).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ArgumentMismatch { ref function, ref argument, .. }
                if function == "transpose" && argument == "n_fft"
        ));
    }

    #[test]
    fn validates_arguments_after_all_are_bound() {
        // fmax only fits under the Nyquist frequency of the new sample rate.
        let arguments = params([
            ("fmax", ParamValue::from(20_000.0)),
            ("sample_rate", ParamValue::from(44_100u32)),
        ]);
        let transform = transform_from_arguments("mel_spectrogram", &arguments).unwrap();
        assert_eq!(transform.arguments()["sample_rate"], ParamValue::Int(44_100));
    }
}
