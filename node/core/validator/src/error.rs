use std::path::PathBuf;
use thiserror::Error;

/// Stage failures from spec.md §7's "Eligibility errors" / "Compilation /
/// validation errors" / "Size / policy errors" classes. None of these
/// propagate into tournament state: a failed submission never reaches the
/// queue.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Error: The tournament is not currently online.")]
	NotAlive,

	#[error(
		"Error: The submitted assignment '{submitted}' does not match the assignment this tournament is configured for: '{configured}'"
	)]
	AssignmentMismatch { submitted: String, configured: String },

	#[error(
		"Submitter '{0}' is not on the approved submitters list.\n\
		If this is a group assignment please check that you are committing to the repo of your designated team representative.\n\
		If this is an individual assignment please check with your tutors that you are added to the approved_submitters list"
	)]
	UnknownSubmitter(String),

	#[error("Error: A prior submission is still being validated. Please wait {remaining_secs} seconds to push a new commit.")]
	SubmissionInFlight { remaining_secs: i64 },

	#[error("this submission has not completed the '{stage}' stage yet")]
	StagePrecondition { stage: &'static str },

	#[error(
		"Student submission not found in the `pre_validation` folder.\n\
		This can be caused by manually retrying a failed test stage. In order to do so you will need to manually \
		re-run all stages in order (including stages that have previously passed).\n\
		However, the recommended approach is to push a new commit which will run the entire test pipeline."
	)]
	StagingDirMissing,

	#[error("An error occurred while preparing the submission:\n{0}")]
	PreparationFailed(String),

	#[error("Compilation failed:\n{0}")]
	CompilationFailed(String),

	#[error("{0}")]
	TestValidationFailed(String),

	#[error("{0}")]
	ProgValidationFailed(String),

	#[error(
		"Error: After compilation and test generation the submission file size ({size_description}) is larger than 150 megabytes.\n\
		Server space is limited so please keep your submissions to a reasonable size.\n\
		Further details:\n{breakdown}"
	)]
	SizeLimitExceeded { size_description: String, breakdown: String },

	#[error("A new submission cannot be made at {0}. Submissions have been closed")]
	SubmissionWindowClosed(String),

	#[error("i/o error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to persist {path}: {source}")]
	SerializeNumTests {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error(transparent)]
	Queue(#[from] tourney_node_core_queue::QueueError),
}
