use env_logger::Builder;
use log::LevelFilter;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn setup_log() {
    INIT.call_once(|| {
        Builder::new().filter(None, LevelFilter::Info).init();
    });
}
