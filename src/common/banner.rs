use colored::*;

pub const VERSION: &str = "0.1.0";

pub fn show() {
    let banner = r#"
    ███████╗██╗███╗   ██╗ ██████╗ ███████╗██████╗ ███████╗ ██████╗ █████╗ ███╗   ██╗
    ██╔════╝██║████╗  ██║██╔════╝ ██╔════╝██╔══██╗██╔════╝██╔════╝██╔══██╗████╗  ██║
    █████╗  ██║██╔██╗ ██║██║  ███╗█████╗  ██████╔╝███████╗██║     ███████║██╔██╗ ██║
    ██╔══╝  ██║██║╚██╗██║██║   ██║██╔══╝  ██╔══██╗╚════██║██║     ██╔══██║██║╚██╗██║
    ██║     ██║██║ ╚████║╚██████╔╝███████╗██║  ██║███████║╚██████╗██║  ██║██║ ╚████║
    ╚═╝     ╚═╝╚═╝  ╚═══╝ ╚═════╝ ╚══════╝╚═╝  ╚═╝╚══════╝ ╚═════╝╚═╝  ╚═╝╚═╝  ╚═══╝
    "#;

    println!("{}", banner.bright_red());
    println!(
        "    {}",
        "A rule-based web and service fingerprint scanner written in Rust".bright_yellow()
    );
    println!("    {}", format!("Version: {}", VERSION).bright_yellow());
    println!();
}
