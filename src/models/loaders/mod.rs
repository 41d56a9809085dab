pub mod toml_loader;

pub use toml_loader::{collect_comments, load_all_comment_files, load_comment_file, CommentFile};
