use tracing::Level;
use tracing_subscriber::fmt;

/// Installs a stderr subscriber when `verbose` is set. Returns false when
/// logging stays off or the host process already installed a subscriber.
pub fn init(verbose: bool) -> bool {
    if !verbose {
        return false;
    }
    fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(false)
        .try_init()
        .is_ok()
}
