//! A global, configurable level filter.
//!
//! The binary sets this when the --log <level> option is provided, and the logger is built from
//! it.  get_level() returns None unless set_level has been called.
use std::sync::atomic::{AtomicU8, Ordering};

use log::LevelFilter;

// zero means unset
static LOG_LEVEL: AtomicU8 = AtomicU8::new(0);

pub fn set_level(level: LevelFilter) {
    LOG_LEVEL.store(discriminant_of(level), Ordering::SeqCst);
}

pub fn get_level() -> Option<LevelFilter> {
    level_of(LOG_LEVEL.load(Ordering::SeqCst))
}

/// The configured level, or `default` if none has been set
pub fn get_level_or(default: LevelFilter) -> LevelFilter {
    get_level().unwrap_or(default)
}

// LevelFilter has a from_usize method, but it's private
fn discriminant_of(filter: LevelFilter) -> u8 {
    match filter {
        LevelFilter::Trace => 1,
        LevelFilter::Debug => 2,
        LevelFilter::Info => 3,
        LevelFilter::Warn => 4,
        LevelFilter::Error => 5,
        LevelFilter::Off => 6,
    }
}

fn level_of(filter: u8) -> Option<LevelFilter> {
    match filter {
        1 => Some(LevelFilter::Trace),
        2 => Some(LevelFilter::Debug),
        3 => Some(LevelFilter::Info),
        4 => Some(LevelFilter::Warn),
        5 => Some(LevelFilter::Error),
        6 => Some(LevelFilter::Off),
        _ => None,
    }
}
