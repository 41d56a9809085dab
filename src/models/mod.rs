pub mod execution;
pub mod exercise;
pub mod loaders;

pub use execution::{ExecutionResult, TIMEOUT_EXIT_CODE};
pub use exercise::{
    Candidate, ExerciseDocument, FeedbackReport, Topic, ValidationCheck, ValidationReport,
    STUDENT_SOLUTION_PLACEHOLDER,
};
pub use loaders::{collect_comments, load_all_comment_files, CommentFile};
