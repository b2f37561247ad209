use log::error;
use std::panic;

/// Install the process panic hook.
///
/// Debug builds get `better_panic` backtraces, release builds get the
/// `human_panic` crash report. Either way the panic is written to the log
/// first and the process exits with status 1, so render worker panics do not
/// leave the CLI hanging on a dead channel.
pub fn initialize_panic_handler() {
    #[cfg(debug_assertions)]
    better_panic::install();

    #[cfg(not(debug_assertions))]
    human_panic::setup_panic!();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        error!(
            "Panic in thread {}: {panic_info}",
            thread.name().unwrap_or("<unnamed>")
        );
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
