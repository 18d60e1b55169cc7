/// Initializes the shared `log`/`env_logger` facade used by every binary in the workspace.
pub fn init() {
    let _ = env_logger::try_init();
}
