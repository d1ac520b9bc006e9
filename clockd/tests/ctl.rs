use std::{io::Write, os::unix::net::UnixListener, process::Command, thread::spawn};

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn test_validate() {
    let result = Command::new(env!("CARGO_BIN_EXE_clock-ctl"))
        .args([
            "validate",
            "-c",
            &format!(
                "{}/testdata/config/invalid.toml",
                env!("CARGO_MANIFEST_DIR")
            ),
        ])
        .output()
        .unwrap();
    assert!(contains_bytes(
        &result.stderr,
        b"unknown field `does-not-exist`"
    ));
    assert_eq!(result.status.code(), Some(1));

    let result = Command::new(env!("CARGO_BIN_EXE_clock-ctl"))
        .args([
            "validate",
            "-c",
            &format!("{}/../clock.toml", env!("CARGO_MANIFEST_DIR")),
        ])
        .output()
        .unwrap();
    assert!(contains_bytes(&result.stderr, b"good"));
    assert_eq!(result.status.code(), Some(0));
}

#[test]
fn test_status() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("control");
    let socket = UnixListener::bind(&socket_path).unwrap();

    spawn(move || {
        let (mut stream, _) = socket.accept().unwrap();
        let response = br#"{"status":"success","message":null,"state":{"program":{"version":"0.3.0","build_commit":"abc","build_commit_date":"2024-01-01","uptime_seconds":12.0},"clock":{"tick":{"source":"remote-backend","reading":{"hour":22,"minute":8,"second":5},"angles":{"hour":304.0,"minute":48.5,"second":30.0},"alarm_ringing":true,"fired":[]},"backend_available":true,"override_time":null,"alarms":{"alarms":[{"hour":7,"minute":30}],"active":0},"precedence":"override-first","alarm_mode":"all"}}}"#;
        // the request has to be read before answering
        let mut length = [0u8; 8];
        std::io::Read::read_exact(&mut stream, &mut length).unwrap();
        let mut request = vec![0u8; u64::from_be_bytes(length) as usize];
        std::io::Read::read_exact(&mut stream, &mut request).unwrap();
        assert_eq!(request, br#"{"request":"status"}"#);

        stream
            .write_all(&(response.len() as u64).to_be_bytes())
            .unwrap();
        stream.write_all(response).unwrap();
    });

    let config_path = dir.path().join("clock.toml");
    std::fs::write(
        &config_path,
        format!(
            "[observability]\ncontrol-path = \"{}\"\n",
            socket_path.display()
        ),
    )
    .unwrap();

    let result = Command::new(env!("CARGO_BIN_EXE_clock-ctl"))
        .args(["status", "-c", config_path.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(contains_bytes(
        &result.stdout,
        b"Time: 10:08:05 PM (remote backend)"
    ));
    assert!(contains_bytes(&result.stdout, b"0: 07:30 (active)"));
    assert!(contains_bytes(&result.stdout, b"ALARM"));
    assert_eq!(result.status.code(), Some(0));
}

#[test]
fn test_invalid_input_rejected_locally() {
    // no daemon is needed, the input never leaves the tool
    let result = Command::new(env!("CARGO_BIN_EXE_clock-ctl"))
        .args(["set-alarm", "25", "0"])
        .output()
        .unwrap();
    assert!(contains_bytes(
        &result.stderr,
        b"hour must be between 0 and 23, got 25"
    ));
    assert_eq!(result.status.code(), Some(1));
}

#[test]
fn test_version() {
    let result = Command::new(env!("CARGO_BIN_EXE_clock-ctl"))
        .args(["-v"])
        .output()
        .unwrap();
    assert!(contains_bytes(
        &result.stderr,
        env!("CARGO_PKG_VERSION").as_bytes()
    ));
    assert_eq!(result.status.code(), Some(0));
}

#[test]
fn test_help() {
    let result = Command::new(env!("CARGO_BIN_EXE_clock-ctl"))
        .args(["-h"])
        .output()
        .unwrap();
    assert!(contains_bytes(&result.stdout, b"usage"));
    assert_eq!(result.status.code(), Some(0));

    let result = Command::new(env!("CARGO_BIN_EXE_clock-daemon"))
        .args(["--help"])
        .output()
        .unwrap();
    assert!(contains_bytes(&result.stdout, b"clock-daemon [-c PATH]"));
    assert_eq!(result.status.code(), Some(0));
}
