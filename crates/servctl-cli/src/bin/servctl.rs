fn main() {
    servctl_cli::set_version(option_env!("SERVCTL_VERSION").unwrap_or(env!("CARGO_PKG_VERSION")));
    let code = servctl_cli::run_from_env();
    std::process::exit(code);
}
