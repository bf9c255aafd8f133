use log::LevelFilter;
use std::io::Write;
use chrono::Local;
use env_logger::{Builder, Target};

pub fn init(debug: bool, silent: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else if silent {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.target(Target::Stderr);

    builder.format(|buf, record| {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(
            buf,
            "[{}] [{}] {}",
            timestamp,
            record.level(),
            record.args()
        )
    });

    builder.init();
}
