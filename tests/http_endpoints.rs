//! HTTP behavior against loopback servers serving canned responses.
//!
//! Covers the MJPEG stream connector (headers, streaming, status failures)
//! and the detect API client (request shape, response parsing, failure
//! classification).

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use camwatch::detect::{DetectionApi, FailureKind, RoboflowClient, RoboflowConfig};
use camwatch::inference::encode_jpeg;
use camwatch::ingest::{HttpTransportConfig, StreamError};
use camwatch::{HttpConnector, InferenceError, ReaderConfig, StreamConnector, StreamReader};
use image::{Rgb, RgbImage};

struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<CapturedRequest> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(CapturedRequest {
        request_line: request_line.trim_end().to_string(),
        headers,
        body,
    })
}

/// Serve `connections` requests, each answered by `respond`, and hand the
/// captured requests back over a channel.
fn serve<F>(connections: usize, respond: F) -> (SocketAddr, mpsc::Receiver<CapturedRequest>)
where
    F: Fn(&mut TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..connections {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let Ok(request) = read_request(&mut stream) else {
                continue;
            };
            let _ = tx.send(request);
            respond(&mut stream);
        }
    });
    (addr, rx)
}

fn jpeg(shade: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(16, 12, Rgb([shade, 0, 255 - shade]));
    encode_jpeg(&image, 90).expect("encode")
}

fn write_response(stream: &mut TcpStream, status: &str, content_type: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

// ----------------------------------------------------------------------------
// Stream connector
// ----------------------------------------------------------------------------

fn mjpeg_server(frames: Vec<Vec<u8>>, hold_open: Duration) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    serve(1, move |stream| {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n";
        let _ = stream.write_all(head.as_bytes());
        for frame in &frames {
            let part = format!(
                "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                frame.len()
            );
            let _ = stream.write_all(part.as_bytes());
            let _ = stream.write_all(frame);
            let _ = stream.write_all(b"\r\n");
            let _ = stream.flush();
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(hold_open);
    })
}

#[test]
fn connector_streams_bytes_with_client_identifier() {
    let frame = jpeg(10);
    let (addr, requests) = mjpeg_server(vec![frame.clone()], Duration::from_millis(100));
    let connector = HttpConnector::new(&HttpTransportConfig::default());

    let mut stream = connector
        .connect(&format!("http://{}/stream", addr))
        .expect("connect");
    let mut body = Vec::new();
    stream.read_to_end(&mut body).expect("read stream");

    let request = requests.recv_timeout(Duration::from_secs(2)).expect("request");
    assert_eq!(request.request_line, "GET /stream HTTP/1.1");
    assert_eq!(request.header("User-Agent"), Some("ESP32-CAM-Reader/1.0"));
    assert!(body.windows(frame.len()).any(|window| window == frame.as_slice()));
}

#[test]
fn connector_reports_http_status() {
    let (addr, _requests) = serve(1, |stream| {
        write_response(stream, "404 Not Found", "text/plain", b"no stream here");
    });
    let connector = HttpConnector::new(&HttpTransportConfig::default());
    let result = connector.connect(&format!("http://{}/stream", addr));
    assert!(matches!(result, Err(StreamError::Status(404))));
}

#[test]
fn reader_decodes_frames_from_http_stream() {
    let frames: Vec<_> = [40u8, 120, 220].iter().map(|&s| jpeg(s)).collect();
    let (addr, _requests) = mjpeg_server(frames, Duration::from_secs(2));
    let config = ReaderConfig {
        url: format!("http://{}/stream", addr),
        stall_timeout: Duration::from_secs(1),
        backoff: Duration::from_millis(20),
        stop_grace: Duration::from_secs(2),
        ..ReaderConfig::default()
    };
    let mut reader = StreamReader::new(config);
    reader.start().expect("start");

    let deadline = Instant::now() + Duration::from_secs(5);
    while reader.status().frames_decoded < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let frame = reader.get_latest_frame().expect("frame");
    assert_eq!(frame.sequence, 3);
    assert_eq!((frame.width(), frame.height()), (16, 12));
    assert!(frame.image().get_pixel(8, 6)[0] > 180);
    reader.stop();
}

// ----------------------------------------------------------------------------
// Detect API client
// ----------------------------------------------------------------------------

fn client_for(addr: SocketAddr, timeout: Duration) -> RoboflowClient {
    RoboflowClient::new(RoboflowConfig {
        endpoint: format!("http://{}/underwater-crack-detection/3", addr),
        api_key: "test-key".to_string(),
        timeout,
        ..RoboflowConfig::default()
    })
}

#[test]
fn client_posts_base64_frame_and_parses_predictions() {
    let body = br#"{"time":0.05,"image":{"width":16,"height":12},"predictions":[
        {"x":100,"y":100,"width":40,"height":20,"confidence":0.85,"class":"crack"},
        {"x":10,"y":12,"width":4,"height":6,"confidence":0.41,"class":"defect"}
    ]}"#;
    let (addr, requests) = serve(1, move |stream| {
        write_response(stream, "200 OK", "application/json", body);
    });
    let mut client = client_for(addr, Duration::from_secs(5));
    let frame = jpeg(99);

    let detections = client.detect(&frame).expect("detections");
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class, "crack");
    let bbox = detections[0].bbox();
    assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (80, 90, 120, 110));

    let request = requests.recv_timeout(Duration::from_secs(2)).expect("request");
    assert!(request
        .request_line
        .starts_with("POST /underwater-crack-detection/3?"));
    assert!(request.request_line.contains("api_key=test-key"));
    assert!(request.request_line.contains("confidence=0.40"));
    assert!(request.request_line.contains("overlap=0.30"));
    assert_eq!(
        request.header("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );
    let decoded = BASE64.decode(&request.body).expect("base64 body");
    assert_eq!(decoded, frame);
}

#[test]
fn client_classifies_error_statuses() {
    let cases = [
        ("400 Bad Request", FailureKind::BadRequest),
        ("401 Unauthorized", FailureKind::Unauthorized),
        ("404 Not Found", FailureKind::NotFound),
        ("500 Internal Server Error", FailureKind::Status),
    ];
    for (status, expected) in cases {
        let (addr, _requests) = serve(1, move |stream| {
            write_response(stream, status, "text/plain", b"nope");
        });
        let mut client = client_for(addr, Duration::from_secs(5));
        let err = client.detect(&jpeg(1)).expect_err(status);
        assert_eq!(err.kind(), expected, "status {}", status);
    }
}

#[test]
fn client_rejects_malformed_body() {
    let (addr, _requests) = serve(1, |stream| {
        write_response(stream, "200 OK", "text/html", b"<html>maintenance</html>");
    });
    let mut client = client_for(addr, Duration::from_secs(5));
    let err = client.detect(&jpeg(1)).expect_err("malformed");
    assert!(matches!(err, InferenceError::Malformed(_)));
}

#[test]
fn client_times_out_on_slow_server() {
    let (addr, _requests) = serve(1, |stream| {
        thread::sleep(Duration::from_millis(1500));
        write_response(stream, "200 OK", "application/json", b"{\"predictions\":[]}");
    });
    let mut client = client_for(addr, Duration::from_millis(300));
    let started = Instant::now();
    let err = client.detect(&jpeg(1)).expect_err("timeout");
    assert_eq!(err.kind(), FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_millis(1400));
}

#[test]
fn client_reports_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let mut client = client_for(addr, Duration::from_secs(2));
    let err = client.detect(&jpeg(1)).expect_err("refused");
    assert_eq!(err.kind(), FailureKind::Connection);
}
