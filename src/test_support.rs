use std::cell::{Cell, RefCell};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::adapters::backend_http::{BackendError, BookingBackend, CancelledBooking, DockTicket};
use crate::adapters::db::{open_connection, run_migrations};
use crate::domain::booking::{BindBookingRequest, Booking, BookingSummary};
use crate::domain::join_params::JoinParams;

static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

const RESPONDER_DEADLINE: Duration = Duration::from_secs(5);

pub fn open_test_connection(test_name: &str) -> Connection {
    let template = ensure_template_db();
    let test_db_path = unique_test_db_path(test_name);

    if let Some(parent) = test_db_path.parent() {
        std::fs::create_dir_all(parent).expect("test db dir should be creatable");
    }

    std::fs::copy(&template, &test_db_path).expect("template db should be copied");
    open_connection(test_db_path.to_string_lossy().as_ref()).expect("test db should open")
}

fn ensure_template_db() -> PathBuf {
    static TEMPLATE_PATH: OnceLock<PathBuf> = OnceLock::new();

    TEMPLATE_PATH
        .get_or_init(|| {
            let template_path = std::env::var("TEST_DB_TEMPLATE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_template_path);

            if let Some(parent) = template_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).expect("template parent dir should be creatable");
            }
            let _ = std::fs::remove_file(&template_path);

            let mut connection = open_connection(template_path.to_string_lossy().as_ref())
                .expect("template db opens");
            run_migrations(&mut connection).expect("template migrations should succeed");

            template_path
        })
        .clone()
}

fn default_template_path() -> PathBuf {
    Path::new("./target/testdb/ev_sandbox_template.db").to_path_buf()
}

fn unique_test_db_path(test_name: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    Path::new("./target/testdb")
        .join(format!("{test_name}-{now}-{counter}.sqlite"))
        .to_path_buf()
}

#[derive(Debug, Clone)]
pub struct CannedResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl CannedResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self::with_content_type(status, "application/json", body)
    }

    pub fn with_content_type(status: u16, content_type: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type,
            body: body.to_string(),
        }
    }
}

/// Serves one canned response per incoming connection, in order, and
/// records each raw request.
pub struct HttpResponder {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl HttpResponder {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn finish(self) -> Vec<String> {
        self.handle
            .join()
            .expect("responder thread should terminate cleanly")
    }
}

pub fn spawn_http_responder(responses: Vec<CannedResponse>) -> HttpResponder {
    let listener = TcpListener::bind("127.0.0.1:0").expect("responder socket should bind");
    listener
        .set_nonblocking(true)
        .expect("listener should switch to non-blocking");
    let port = listener
        .local_addr()
        .expect("addr should be available")
        .port();

    let handle = std::thread::spawn(move || {
        let deadline = Instant::now() + RESPONDER_DEADLINE;
        let mut requests = Vec::new();

        for response in responses {
            let stream = loop {
                match listener.accept() {
                    Ok((stream, _)) => break Some(stream),
                    Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            break None;
                        }
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break None,
                }
            };

            let Some(mut stream) = stream else {
                break;
            };
            requests.push(read_request(&mut stream));
            write_response(&mut stream, &response);
        }

        requests
    });

    HttpResponder { port, handle }
}

/// Answers one subscription with event-stream headers and a comment, then
/// keeps the response open until the client hangs up.
pub struct OpenEventStream {
    port: u16,
    handle: JoinHandle<bool>,
}

impl OpenEventStream {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// `true` when the client closed its socket before the wait ran out.
    pub fn client_hung_up(self) -> bool {
        self.handle
            .join()
            .expect("event stream thread should terminate cleanly")
    }
}

pub fn spawn_open_event_stream(hang_up_within: Duration) -> OpenEventStream {
    let listener = TcpListener::bind("127.0.0.1:0").expect("stream socket should bind");
    let port = listener
        .local_addr()
        .expect("addr should be available")
        .port();

    let handle = std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return false;
        };
        read_request(&mut stream);
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n: connected\n\n";
        if stream.write_all(head.as_bytes()).is_err() || stream.flush().is_err() {
            return false;
        }

        stream
            .set_read_timeout(Some(hang_up_within))
            .expect("read timeout should be configurable");
        let mut buffer = [0_u8; 256];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) => return true,
                Ok(_) => continue,
                Err(error) if error.kind() == std::io::ErrorKind::ConnectionReset => return true,
                Err(_) => return false,
            }
        }
    });

    OpenEventStream { port, handle }
}

fn read_request(stream: &mut TcpStream) -> String {
    stream
        .set_nonblocking(false)
        .expect("stream should switch to blocking");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout should be configurable");

    let mut reader = BufReader::new(stream);
    let mut head = String::new();
    let mut content_length = 0_usize;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
        let end_of_head = line == "\r\n";
        head.push_str(&line);
        if end_of_head {
            break;
        }
    }

    let mut body = vec![0_u8; content_length];
    let _ = reader.read_exact(&mut body);
    head.push_str(&String::from_utf8_lossy(&body));
    head
}

fn write_response(stream: &mut TcpStream, response: &CannedResponse) {
    let payload = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len(),
        response.body
    );
    let _ = stream.write_all(payload.as_bytes());
    let _ = stream.flush();
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Status",
    }
}

#[derive(Debug, Clone)]
pub enum BindReply {
    Echo,
    Status(u16, Option<String>),
    MissingToken,
}

/// In-memory backend that records what the flow asked of it.
#[derive(Debug)]
pub struct FakeBackend {
    bookings: Vec<BookingSummary>,
    bind_reply: BindReply,
    list_calls: Cell<usize>,
    bind_requests: RefCell<Vec<(String, BindBookingRequest)>>,
    cancelled: RefCell<Vec<String>>,
}

impl FakeBackend {
    pub fn with_bookings(bookings: Vec<BookingSummary>) -> Self {
        Self {
            bookings,
            bind_reply: BindReply::Echo,
            list_calls: Cell::new(0),
            bind_requests: RefCell::new(Vec::new()),
            cancelled: RefCell::new(Vec::new()),
        }
    }

    pub fn replying(mut self, reply: BindReply) -> Self {
        self.bind_reply = reply;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    pub fn bind_requests(&self) -> Vec<(String, BindBookingRequest)> {
        self.bind_requests.borrow().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.borrow().clone()
    }
}

pub fn summary(id: &str, code: &str) -> BookingSummary {
    BookingSummary {
        id: id.to_string(),
        code: code.to_string(),
        status: "confirmed".to_string(),
        vehicle_model_id: Some("vf8".to_string()),
        station_name: None,
        starts_at: None,
    }
}

impl BookingBackend for FakeBackend {
    fn join_dock(&self, dock_code: &str) -> Result<DockTicket, BackendError> {
        Ok(DockTicket {
            params: JoinParams {
                realtime_token: "tok".to_string(),
                channel_id: format!("session:{dock_code}"),
                session_id: format!("s-{dock_code}"),
                expires_at: "2099-01-01T00:00:00Z".to_string(),
            },
            session_url: None,
        })
    }

    fn list_confirmed_bookings(&self) -> Result<Vec<BookingSummary>, BackendError> {
        self.list_calls.set(self.list_calls.get() + 1);
        Ok(self.bookings.clone())
    }

    fn bind_booking(
        &self,
        session_id: &str,
        request: &BindBookingRequest,
    ) -> Result<Booking, BackendError> {
        self.bind_requests
            .borrow_mut()
            .push((session_id.to_string(), request.clone()));

        match &self.bind_reply {
            BindReply::Echo => {
                let parent = self
                    .bookings
                    .iter()
                    .find(|booking| booking.code == request.booking_code)
                    .map(|booking| booking.id.clone())
                    .unwrap_or_default();
                Ok(Booking {
                    id: session_id.to_string(),
                    booking_id: parent,
                    vehicle_model_id: Some("vf8".to_string()),
                    soc_start: request.soc_start,
                    target_soc: request.target_soc,
                })
            }
            BindReply::Status(status, message) => Err(BackendError::Status {
                status: *status,
                message: message.clone(),
            }),
            BindReply::MissingToken => Err(BackendError::MissingToken),
        }
    }

    fn cancel_booking(&self, booking_id: &str) -> Result<CancelledBooking, BackendError> {
        self.cancelled.borrow_mut().push(booking_id.to_string());
        Ok(CancelledBooking {
            id: booking_id.to_string(),
            status: "cancelled".to_string(),
        })
    }
}
