mod process;

pub use process::{is_process_alive, is_same_process, kill_process, send_signal};
