//! Backend message builders and a scripted fake server for driver tests.
//!
//! Compiled for this crate's tests and, with the `testing` feature, for
//! dependents that want to exercise a [`Connection`] without a server.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::Connection;
use super::info::ConnectionInfo;

pub fn msg(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

pub fn auth_ok() -> Vec<u8> {
    msg(b'R', &0i32.to_be_bytes())
}

pub fn auth_cleartext() -> Vec<u8> {
    msg(b'R', &3i32.to_be_bytes())
}

pub fn auth_md5(salt: [u8; 4]) -> Vec<u8> {
    let mut body = 5i32.to_be_bytes().to_vec();
    body.extend_from_slice(&salt);
    msg(b'R', &body)
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    cstr(&mut body, name);
    cstr(&mut body, value);
    msg(b'S', &body)
}

pub fn backend_key(process_id: i32, secret_key: i32) -> Vec<u8> {
    let mut body = process_id.to_be_bytes().to_vec();
    body.extend_from_slice(&secret_key.to_be_bytes());
    msg(b'K', &body)
}

pub fn ready(status: u8) -> Vec<u8> {
    msg(b'Z', &[status])
}

/// RowDescription with text-format columns of the given type OIDs.
pub fn row_description(columns: &[(&str, u32)]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i16(columns.len() as i16);
    for (name, type_oid) in columns {
        cstr(&mut body, name);
        body.put_u32(0);
        body.put_i16(0);
        body.put_u32(*type_oid);
        body.put_i16(-1);
        body.put_i32(-1);
        body.put_i16(0);
    }
    msg(b'T', &body)
}

pub fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i16(values.len() as i16);
    for value in values {
        match value {
            Some(text) => {
                body.put_i32(text.len() as i32);
                body.put_slice(text.as_bytes());
            }
            None => body.put_i32(-1),
        }
    }
    msg(b'D', &body)
}

pub fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    cstr(&mut body, tag);
    msg(b'C', &body)
}

pub fn error_response(code: &str, message: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u8(b'S');
    cstr(&mut body, "ERROR");
    body.put_u8(b'C');
    cstr(&mut body, code);
    body.put_u8(b'M');
    cstr(&mut body, message);
    body.put_u8(0);
    msg(b'E', &body)
}

pub fn parse_complete() -> Vec<u8> {
    msg(b'1', &[])
}

pub fn bind_complete() -> Vec<u8> {
    msg(b'2', &[])
}

pub fn empty_query() -> Vec<u8> {
    msg(b'I', &[])
}

pub fn copy_out_response() -> Vec<u8> {
    msg(b'H', &[0, 0, 0])
}

pub fn copy_in_response() -> Vec<u8> {
    msg(b'G', &[0, 0, 0])
}

pub fn copy_data(chunk: &str) -> Vec<u8> {
    msg(b'd', chunk.as_bytes())
}

pub fn copy_done() -> Vec<u8> {
    msg(b'c', &[])
}

/// One step of a fake server's script.
pub enum Step {
    /// Read the untagged startup packet.
    Startup,
    /// Read one frontend message and assert its type.
    Expect(u8),
    Reply(Vec<u8>),
    Stall(Duration),
    /// Close the socket immediately.
    Hangup,
}

/// AuthenticationOk, a parameter, backend key 42/7, ReadyForQuery.
pub fn trust_startup() -> Vec<Step> {
    vec![
        Step::Startup,
        Step::Reply(
            [
                auth_ok(),
                parameter_status("server_version", "16.2"),
                backend_key(42, 7),
                ready(b'I'),
            ]
            .concat(),
        ),
    ]
}

/// A simple query answered with `reply` and ReadyForQuery in `status`.
pub fn simple_query(reply: Vec<Vec<u8>>, status: u8) -> Vec<Step> {
    let mut bytes = reply.concat();
    bytes.extend(ready(status));
    vec![Step::Expect(b'Q'), Step::Reply(bytes)]
}

/// An extended query (Parse/Bind/Describe/Execute/Sync) answered with
/// ParseComplete, BindComplete, `reply` and ReadyForQuery in `status`.
pub fn extended_query(reply: Vec<Vec<u8>>, status: u8) -> Vec<Step> {
    let mut bytes = [parse_complete(), bind_complete()].concat();
    bytes.extend(reply.concat());
    bytes.extend(ready(status));
    let mut steps: Vec<Step> = b"PBDES".iter().map(|&tag| Step::Expect(tag)).collect();
    steps.push(Step::Reply(bytes));
    steps
}

/// Frontend messages the server received: (type, body).
pub type Received = Vec<(u8, Vec<u8>)>;

/// Serve one connection following `script`, then absorb input until EOF.
pub async fn fake_server(script: Vec<Step>) -> (ConnectionInfo, JoinHandle<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        run_script(&mut socket, script).await
    });
    let info = ConnectionInfo::new("127.0.0.1", port, "music").user("tester");
    (info, handle)
}

/// A connection already through a trust handshake, then following `steps`.
pub async fn open_connection(steps: Vec<Step>) -> (Connection, JoinHandle<Received>) {
    let mut script = trust_startup();
    script.extend(steps);
    let (info, server) = fake_server(script).await;
    let mut conn = Connection::new(info);
    conn.open().await.unwrap();
    (conn, server)
}

async fn run_script(socket: &mut TcpStream, script: Vec<Step>) -> Received {
    let mut received = Vec::new();
    for step in script {
        match step {
            Step::Startup => {
                let len = socket.read_i32().await.unwrap();
                let mut body = vec![0u8; len as usize - 4];
                socket.read_exact(&mut body).await.unwrap();
                received.push((0, body));
            }
            Step::Expect(tag) => {
                let got = socket.read_u8().await.unwrap();
                let len = socket.read_i32().await.unwrap();
                let mut body = vec![0u8; len as usize - 4];
                socket.read_exact(&mut body).await.unwrap();
                assert_eq!(got as char, tag as char, "unexpected frontend message");
                received.push((got, body));
            }
            Step::Reply(bytes) => socket.write_all(&bytes).await.unwrap(),
            Step::Stall(duration) => tokio::time::sleep(duration).await,
            Step::Hangup => return received,
        }
    }

    // Record whatever else arrives (Terminate, usually) until the client hangs up.
    loop {
        let Ok(tag) = socket.read_u8().await else { break };
        let Ok(len) = socket.read_i32().await else { break };
        let mut body = vec![0u8; (len as usize).saturating_sub(4)];
        if socket.read_exact(&mut body).await.is_err() {
            break;
        }
        received.push((tag, body));
    }
    received
}
