pub mod locking;
pub mod scoped;
pub mod work_dir;

pub use scoped::DirGuard;
pub use work_dir::{WorkDir, DONE_DIR};
