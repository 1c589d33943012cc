#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine;
use telelink::frame::{decode_packet, encode_frame, FrameFinder};
use telelink::message::{OdometryDelta, Packet};

const CAPTURE: &str = "AC2lYnRv9mRmcm9tAWRkYXRhoW1PZG9tZXRyeURlbHRhpGpzdGFydF90aW1lGxIGSBQBxONSaGVuZF90aW1lGxkGSBQBxmnxbmRlbHRhX3Bvc2l0aW9ugvkBAvkBFHFkZWx0YV9vcmllbnRhdGlvbvkBB2R0aW1lGxAGSBQBxmnyYmlkGWGDBL4A";

const ODOMETRY_JSON: &str = r#"{"to":2,"from":null,"data":{"OdometryDelta":{"start_time":10,"end_time":20,"delta_position":[0.5,0.0],"delta_orientation":0.25}},"time":30,"id":77}"#;

fn telelink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_telelink"));
    cmd.env_remove("TELELINK_URL")
        .env_remove("RUST_LOG")
        .args(["--log-level", "error"]);
    cmd
}

fn temp_file(tag: &str, contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "telelink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("temp file should be writable");
    path
}

fn run_with_stdin(mut cmd: Command, input: &[u8]) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("command should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input)
        .expect("stdin should accept input");
    child.wait_with_output().expect("command should finish")
}

fn wait_with_deadline(mut child: Child, deadline: Duration) -> Output {
    let start = Instant::now();
    loop {
        if child.try_wait().expect("child should be pollable").is_some() {
            return child.wait_with_output().expect("output should be readable");
        }
        if start.elapsed() >= deadline {
            let _ = child.kill();
            panic!("command did not exit within {deadline:?}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn capture_bytes() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(CAPTURE)
        .expect("capture should be valid base64")
}

#[test]
fn version_prints_name() {
    let output = telelink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("telelink "));
}

#[test]
fn decode_capture_file_as_json() {
    let path = temp_file("capture", &capture_bytes());
    let output = telelink()
        .args(["--format", "json", "decode"])
        .arg(&path)
        .output()
        .expect("decode should run");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    let line: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json line");
    assert_eq!(line["topic"], "OdometryDelta");
    assert_eq!(line["from"], 1);
    assert_eq!(line["to"], serde_json::Value::Null);
    assert_eq!(line["id"], 24963);
    assert_eq!(line["time"], 1_768_100_626_590_194u64);
    assert_eq!(
        line["data"]["OdometryDelta"]["start_time"],
        1_768_100_626_490_194u64
    );
}

#[test]
fn decode_reports_corrupt_frames() {
    let mut bytes = capture_bytes();
    bytes[9] ^= 0x20;

    let mut cmd = telelink();
    cmd.args(["--format", "json", "decode"]);
    let output = run_with_stdin(cmd, &bytes);

    assert_eq!(output.status.code(), Some(60));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 1 frames failed to decode"));
}

#[test]
fn encode_raw_then_decode_round_trips() {
    let encoded = telelink()
        .args(["--format", "raw", "encode", "--json", ODOMETRY_JSON])
        .output()
        .expect("encode should run");
    assert!(encoded.status.success());
    assert_eq!(encoded.stdout.first(), Some(&0x00));
    assert_eq!(encoded.stdout.last(), Some(&0x00));

    let mut cmd = telelink();
    cmd.args(["--format", "raw", "decode"]);
    let decoded = run_with_stdin(cmd, &encoded.stdout);
    assert!(decoded.status.success());

    let packet: Packet = serde_json::from_slice(&decoded.stdout).expect("raw output is a packet");
    let expected: Packet = serde_json::from_str(ODOMETRY_JSON).unwrap();
    assert_eq!(packet, expected);
}

#[test]
fn encode_base64_matches_library_frame() {
    let output = telelink()
        .args(["--format", "pretty", "encode", "--base64", "--json", ODOMETRY_JSON])
        .output()
        .expect("encode should run");
    assert!(output.status.success());

    let packet: Packet = serde_json::from_str(ODOMETRY_JSON).unwrap();
    let frame = encode_frame(&packet).unwrap();
    let expected = base64::engine::general_purpose::STANDARD.encode(&frame);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), expected);
}

#[test]
fn encode_rejects_bad_input() {
    let not_json = telelink()
        .args(["encode", "--json", "{oops"])
        .output()
        .expect("encode should run");
    assert_eq!(not_json.status.code(), Some(64));

    let not_packet = telelink()
        .args(["encode", "--json", r#"{"data":{}}"#])
        .output()
        .expect("encode should run");
    assert_eq!(not_packet.status.code(), Some(60));
}

#[test]
fn send_times_out_when_device_is_unreachable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        listener.local_addr().expect("local addr").port()
    };

    let output = telelink()
        .args(["send", &format!("tcp://127.0.0.1:{port}")])
        .args(["--json", ODOMETRY_JSON, "--wait-open", "300ms"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn send_delivers_packet_to_device() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let url = format!("tcp://{}", listener.local_addr().expect("local addr"));

    let child = telelink()
        .args(["send", &url, "--json", ODOMETRY_JSON])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("send should start");

    let (mut stream, _) = listener.accept().expect("send should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    let mut received = Vec::new();
    stream
        .read_to_end(&mut received)
        .expect("device should read until the client closes");

    let output = wait_with_deadline(child, Duration::from_secs(10));
    assert!(output.status.success());

    let frames = FrameFinder::new().push_bytes(&received);
    let packets: Vec<Packet> = frames
        .iter()
        .filter(|frame| !frame.is_empty())
        .map(|frame| decode_packet(frame).expect("frame should decode"))
        .collect();
    let expected: Packet = serde_json::from_str(ODOMETRY_JSON).unwrap();
    assert_eq!(packets, vec![expected]);
}

#[test]
fn listen_prints_packets_from_device() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let url = format!("tcp://{}", listener.local_addr().expect("local addr"));

    let child = telelink()
        .args(["--format", "json", "listen", &url, "--count", "2"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen should start");

    let (mut stream, _) = listener.accept().expect("listen should connect");
    for id in [1, 2] {
        let packet = Packet::new(
            OdometryDelta {
                start_time: 1,
                end_time: 2,
                delta_position: [0.0, 0.0],
                delta_orientation: 0.0,
            },
            3,
            id,
        )
        .with_from(1);
        stream
            .write_all(&encode_frame(&packet).unwrap())
            .expect("device write");
    }

    let output = wait_with_deadline(child, Duration::from_secs(10));
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<u64> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("json line");
            assert_eq!(value["topic"], "OdometryDelta");
            value["id"].as_u64().expect("numeric id")
        })
        .collect();
    assert_eq!(ids, vec![1, 2]);
}
