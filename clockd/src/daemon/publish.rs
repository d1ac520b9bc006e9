use std::fmt::Write;

use clock_proto::{Alarm, ClockReading};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    config::PublishConfig,
    system::{ClockAction, ClockHandle},
};

const MAX_HEADER_SIZE: usize = 8 * 1024;
const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug, PartialEq)]
struct Response {
    status: u16,
    body: Option<Value>,
}

impl Response {
    fn json(status: u16, body: Value) -> Self {
        Response {
            status,
            body: Some(body),
        }
    }

    fn success() -> Self {
        Self::json(200, json!({"status": "success"}))
    }

    fn error(message: &str) -> Self {
        Self::json(400, json!({"status": "error", "message": message}))
    }

    fn empty(status: u16) -> Self {
        Response { status, body: None }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

fn format_response(buf: &mut String, response: &Response) -> std::fmt::Result {
    let content = match &response.body {
        Some(body) => body.to_string(),
        None => String::new(),
    };

    write!(
        buf,
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason(response.status)
    )?;
    buf.push_str("access-control-allow-origin: *\r\n");
    buf.push_str("access-control-allow-methods: GET, POST, OPTIONS\r\n");
    buf.push_str("access-control-allow-headers: Content-Type\r\n");
    buf.push_str("cache-control: no-store\r\n");
    buf.push_str("connection: close\r\n");
    if response.body.is_some() {
        buf.push_str("content-type: application/json\r\n");
    }
    write!(buf, "content-length: {}\r\n\r\n", content.len())?;
    buf.push_str(&content);

    Ok(())
}

fn invalid_data(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

async fn read_request(stream: &mut (impl AsyncRead + Unpin)) -> std::io::Result<Request> {
    let mut data = Vec::with_capacity(1024);
    let header_end = loop {
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break end;
        }
        if data.len() > MAX_HEADER_SIZE {
            return Err(invalid_data("request header too large"));
        }
        let mut chunk = [0; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(invalid_data("connection closed in request header"));
        }
        data.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&data[..header_end])
        .map_err(|_| invalid_data("request header is not utf-8"))?;
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let (Some(method), Some(target)) = (request_line.next(), request_line.next()) else {
        return Err(invalid_data("malformed request line"));
    };

    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid_data("invalid content-length"))?;
            }
        }
    }
    if content_length > MAX_BODY_SIZE {
        return Err(invalid_data("request body too large"));
    }

    // clients append a cache busting query
    let path = target.split('?').next().unwrap_or(target).to_owned();
    let method = method.to_owned();

    let mut body = data.split_off(header_end + 4);
    body.truncate(content_length);
    if body.len() < content_length {
        let already = body.len();
        body.resize(content_length, 0);
        stream.read_exact(&mut body[already..]).await?;
    }

    Ok(Request { method, path, body })
}

fn field(body: &Value, name: &str, alias: &str) -> Option<i64> {
    body.get(name).or_else(|| body.get(alias))?.as_i64()
}

fn set_alarm_action(body: &Value) -> Option<ClockAction> {
    let hour = field(body, "hora", "hour")?;
    let minute = field(body, "minuto", "minute")?;
    Alarm::new(hour, minute).ok().map(ClockAction::SetAlarm)
}

fn set_time_action(body: &Value) -> Option<ClockAction> {
    let hour = field(body, "hora", "hour")?;
    let minute = field(body, "minuto", "minute")?;
    let second = field(body, "segundo", "second")?;
    ClockReading::new(hour, minute, second)
        .ok()
        .map(ClockAction::SetTime)
}

async fn perform(clock: &ClockHandle, action: ClockAction) -> Response {
    match clock.perform(action).await {
        Ok(_) => Response::success(),
        Err(message) => Response::error(&message),
    }
}

async fn route(request: &Request, clock: &ClockHandle) -> Response {
    let body = || serde_json::from_slice::<Value>(&request.body).ok();

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => Response::empty(204),
        ("GET", "/clock_data.json") => match clock.snapshot().remote_reading() {
            Some(reading) => match serde_json::to_value(reading) {
                Ok(value) => Response::json(200, value),
                Err(_) => Response::empty(500),
            },
            None => Response::empty(503),
        },
        ("POST", "/set_alarm") => match body() {
            None => Response::error("Invalid JSON"),
            Some(body) => match set_alarm_action(&body) {
                Some(action) => perform(clock, action).await,
                None => Response::error("Invalid hour or minute"),
            },
        },
        ("POST", "/set_time") => match body() {
            None => Response::error("Invalid JSON"),
            Some(body) => match set_time_action(&body) {
                Some(action) => perform(clock, action).await,
                None => Response::error("Invalid time values"),
            },
        },
        ("POST", "/sync_time") => perform(clock, ClockAction::Sync).await,
        _ => Response::empty(404),
    }
}

pub async fn spawn(
    config: PublishConfig,
    clock: ClockHandle,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    let listener = TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "publishing clock over http");

    Ok(tokio::spawn(async move {
        let result = serve(listener, clock).await;
        if let Err(ref e) = result {
            warn!("Abnormal termination of the publish endpoint: {e}");
        }
        result
    }))
}

async fn serve(listener: TcpListener, clock: ClockHandle) -> std::io::Result<()> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let clock = clock.clone();

        tokio::spawn(async move {
            let response = match read_request(&mut stream).await {
                Ok(request) => {
                    debug!(%peer, method = %request.method, path = %request.path, "http request");
                    route(&request, &clock).await
                }
                Err(error) => {
                    debug!(%peer, ?error, "unreadable http request");
                    Response::empty(400)
                }
            };

            let mut buf = String::with_capacity(512);
            if format_response(&mut buf, &response).is_ok() {
                if let Err(error) = stream.write_all(buf.as_bytes()).await {
                    debug!(%peer, ?error, "could not send http response");
                }
            }
        });
    }
}
