#![forbid(unsafe_code)]

#[tokio::main]
async fn main() -> std::io::Result<std::process::ExitCode> {
    clockd::ctl_main().await
}
