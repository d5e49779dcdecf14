use crate::logging;
use crate::settings::Settings;
use crate::settings_io;

/// Load settings early to get log level configuration.
pub(crate) fn load_initial_settings() -> Settings {
    settings_io::load_effective_settings()
}

/// Initialize logging system.
pub(crate) fn init_logging_and_banner(settings: &Settings) {
    let log_level = settings.log_level();

    if let Err(e) = logging::init_logging(log_level, settings.log_to_file) {
        eprintln!("Failed to initialize logging: {:#}", e);
    } else {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            log_level = %log_level,
            "DeskDup started"
        );
    }

    if settings.log_to_file {
        logging::auto_cleanup_old_logs(settings.log_retention_days);
    }
}

/// Log active settings for debugging.
pub(crate) fn log_active_settings(settings: &Settings) {
    tracing::debug!(
        output_index = settings.output_index,
        timeout_ms = settings.timeout_ms,
        max_consecutive_errors = settings.max_consecutive_errors,
        log_level = ?settings.log_level,
        log_to_file = settings.log_to_file,
        log_retention_days = settings.log_retention_days,
        "Settings configuration"
    );
}

/// Log panics before the default hook prints them.
pub(crate) fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(?panic_info, "Application panic detected");
        default_panic(panic_info);
    }));
}
