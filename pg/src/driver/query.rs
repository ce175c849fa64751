//! Statement dispatch and result draining.
//!
//! Statements without values go out as a simple Query; statements with
//! values use Parse/Bind/Describe/Execute/Sync on the unnamed statement,
//! with every value copied into the outbound buffer.

use quarry_core::{IntoComponents, QueryComponents, Value};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::connection::{Connection, UnknownStatusPolicy};
use super::io::flush_outbound;
use super::result::{QueryResult, ResultStatus};
use super::status::ConnectionStatus;
use super::{PgError, PgResult};
use crate::protocol::{BackendMessage, FrontendMessage, PgEncoder, TransactionStatus};

impl Connection {
    /// Dispatch a statement without waiting for results.
    ///
    /// Follow with [`get_result`](Self::get_result) until it yields `None`.
    pub async fn send_query(&mut self, query: &QueryComponents) -> PgResult<()> {
        self.ensure_ready()?;

        let sql = query.to_sql();
        if let Some(logger) = &self.logger {
            logger.debug(&sql);
        }
        trace!(params = query.values().len(), extended = !query.values().is_empty(), "dispatching statement");

        self.write_buf.clear();
        let encoded = if query.values().is_empty() {
            PgEncoder::encode_query_string(&mut self.write_buf, &sql)
        } else {
            PgEncoder::encode_extended_query(&mut self.write_buf, &sql, query.values())
        };
        if let Err(e) = encoded {
            let e = PgError::from(e);
            self.record_error(&e);
            return Err(e);
        }

        let wait = self.wait();
        let Some(stream) = self.stream.as_mut() else {
            return Err(PgError::NotReady(self.status));
        };
        self.in_flight = true;
        let sent = flush_outbound(stream, &mut self.write_buf, wait).await;
        self.in_flight = false;
        match sent {
            Ok(true) => {
                self.awaiting_results = true;
                Ok(())
            }
            // Nothing reached the server; the connection stays usable.
            Ok(false) => {
                let e = PgError::Timeout("sending query");
                self.record_error(&e);
                Err(e)
            }
            Err(e) => Err(self.mark_broken(e)),
        }
    }

    /// Next result of the dispatched statement, `None` once all are read.
    ///
    /// A server error is returned after the server is ready again, so the
    /// connection stays usable.
    pub async fn get_result(&mut self) -> PgResult<Option<QueryResult>> {
        if self.in_flight {
            return Err(self.mark_broken(PgError::Broken(
                "A previous operation was interrupted mid-exchange".to_string(),
            )));
        }
        if !self.awaiting_results {
            return Ok(None);
        }

        self.in_flight = true;
        let out = self.read_result().await;
        self.in_flight = false;

        match out {
            Err(e) if e.is_fatal() => Err(self.mark_broken(e)),
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
            ok => ok,
        }
    }

    async fn read_result(&mut self) -> PgResult<Option<QueryResult>> {
        let wait = self.wait();
        let mut fields = None;
        let mut rows = Vec::new();
        let mut copy_chunks: Option<Vec<Vec<u8>>> = None;
        let mut failure: Option<PgError> = None;

        loop {
            match self.recv(wait).await? {
                BackendMessage::RowDescription(desc) => fields = Some(desc),
                BackendMessage::DataRow(columns) => rows.push(columns),
                BackendMessage::CommandComplete(tag) => {
                    let status = if copy_chunks.is_some() {
                        ResultStatus::CopyOut
                    } else if fields.is_some() {
                        ResultStatus::TuplesOk
                    } else {
                        ResultStatus::CommandOk
                    };
                    let result = QueryResult::new(status, fields.take(), std::mem::take(&mut rows), Some(tag));
                    return Ok(Some(
                        result.with_copy_data(copy_chunks.take().unwrap_or_default()),
                    ));
                }
                BackendMessage::EmptyQueryResponse => {
                    return Ok(Some(QueryResult::new(ResultStatus::EmptyQuery, None, vec![], None)));
                }
                BackendMessage::ErrorResponse(err) => {
                    failure.get_or_insert(PgError::server(err));
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.awaiting_results = false;
                    self.transaction_status = status;
                    if let TransactionStatus::Unknown(byte) = status {
                        warn!(status = ?(byte as char), "unknown transaction status");
                        self.set_status(ConnectionStatus::Unknown);
                    }
                    return match failure {
                        Some(e) => Err(e),
                        None => Ok(None),
                    };
                }
                BackendMessage::CopyOutResponse { .. } => copy_chunks = Some(Vec::new()),
                BackendMessage::CopyData(chunk) => {
                    if let Some(chunks) = copy_chunks.as_mut() {
                        chunks.push(chunk);
                    }
                }
                BackendMessage::CopyDone => {}
                BackendMessage::CopyInResponse { .. } => {
                    self.refuse_copy_in().await?;
                }
                BackendMessage::ParseComplete
                | BackendMessage::BindComplete
                | BackendMessage::CloseComplete
                | BackendMessage::NoData
                | BackendMessage::PortalSuspended
                | BackendMessage::ParameterDescription(_) => {}
                BackendMessage::ParameterStatus { name, value } => {
                    debug!(%name, %value, "server parameter changed");
                }
                BackendMessage::NoticeResponse(notice) => {
                    debug!(severity = %notice.severity, "{}", notice.message);
                }
                BackendMessage::NotificationResponse { channel, .. } => {
                    debug!(%channel, "notification ignored");
                }
                BackendMessage::Unknown(tag) => match self.settings.unknown_status {
                    // Inside a row or COPY stream the message is skipped so the
                    // rows stay in one result.
                    UnknownStatusPolicy::Accept if fields.is_some() || copy_chunks.is_some() => {
                        warn!(tag = ?(tag as char), "unclassified message skipped");
                    }
                    UnknownStatusPolicy::Accept => {
                        warn!(tag = ?(tag as char), "unclassified response accepted");
                        return Ok(Some(QueryResult::new(ResultStatus::Unknown, None, vec![], None)));
                    }
                    UnknownStatusPolicy::Reject => {
                        failure.get_or_insert(PgError::Protocol(format!(
                            "Unclassified response {:?}",
                            tag as char
                        )));
                    }
                },
                other => {
                    return Err(PgError::Protocol(format!(
                        "Unexpected message while reading results: {:?}",
                        other
                    )));
                }
            }
        }
    }

    /// Answer CopyInResponse with CopyFail; the server then reports an error.
    async fn refuse_copy_in(&mut self) -> PgResult<()> {
        let wait = self.wait();
        self.write_buf.clear();
        FrontendMessage::CopyFail("COPY FROM STDIN is not supported by this client".to_string())
            .encode_into(&mut self.write_buf);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PgError::Broken("Connection is closed".to_string()))?;
        if flush_outbound(stream, &mut self.write_buf, wait).await? {
            Ok(())
        } else {
            Err(PgError::Timeout("refusing COPY"))
        }
    }

    /// Run a statement and return its last result.
    ///
    /// Multi-statement text yields several results; each is checked, and
    /// only the last is kept.
    pub async fn execute(&mut self, query: impl IntoComponents) -> PgResult<QueryResult> {
        let query = query.into_components()?;
        self.deadline = self.settings.statement_timeout.map(|t| Instant::now() + t);
        let out = self.run(&query).await;
        self.deadline = None;
        out
    }

    /// Like [`execute`](Self::execute), abandoning the statement at `deadline`.
    ///
    /// Expiry before dispatch leaves the connection usable; expiry after
    /// dispatch closes it.
    pub async fn execute_with_deadline(
        &mut self,
        query: impl IntoComponents,
        deadline: Instant,
    ) -> PgResult<QueryResult> {
        let query = query.into_components()?;
        self.deadline = Some(deadline);
        let out = self.run(&query).await;
        self.deadline = None;
        out
    }

    /// Run `sql` with `$n`, `%@` or `\(name)` markers bound to `values`.
    pub async fn execute_params<I, V>(&mut self, sql: &str, values: I) -> PgResult<QueryResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let query = QueryComponents::parse(sql, values)?;
        self.execute(query).await
    }

    /// Send several statements as one simple query, values inlined as
    /// escaped literals, and return the last result.
    pub async fn execute_batch(&mut self, statements: &[QueryComponents]) -> PgResult<QueryResult> {
        let mut sql = Vec::with_capacity(statements.len());
        for statement in statements {
            sql.push(statement.to_inline_sql()?);
        }
        self.execute(QueryComponents::from_sql(sql.join("; "))).await
    }

    async fn run(&mut self, query: &QueryComponents) -> PgResult<QueryResult> {
        self.send_query(query).await?;

        let mut last = None;
        loop {
            match self.get_result().await {
                Ok(Some(result)) => last = Some(result),
                Ok(None) => break,
                Err(e) => {
                    if self.awaiting_results {
                        // Fatal errors clear this; only a server error mid-stream lands here.
                        self.drain().await;
                    }
                    return Err(e);
                }
            }
        }

        let result = last.ok_or(PgError::NoResult)?;
        debug!(
            status = ?result.status(),
            rows = result.row_count(),
            tag = result.command_tag().unwrap_or(""),
            "statement complete"
        );
        Ok(result)
    }

    /// Discard remaining results of the current statement.
    async fn drain(&mut self) {
        while self.awaiting_results {
            if self.get_result().await.is_err() && self.status == ConnectionStatus::Bad {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::*;
    use crate::protocol::oid;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn script(rest: Vec<Step>) -> Vec<Step> {
        let mut steps = trust_startup();
        steps.extend(rest);
        steps
    }

    async fn opened(steps: Vec<Step>) -> (Connection, tokio::task::JoinHandle<Received>) {
        let (info, server) = fake_server(script(steps)).await;
        let mut conn = Connection::new(info);
        conn.open().await.unwrap();
        (conn, server)
    }

    fn artist_rows() -> Vec<Vec<u8>> {
        vec![
            row_description(&[("id", oid::INT4), ("name", oid::TEXT), ("genre", oid::TEXT)]),
            data_row(&[Some("1"), Some("Josh Rouse"), Some("Country")]),
            command_complete("SELECT 1"),
        ]
    }

    #[tokio::test]
    async fn test_simple_query() {
        let (mut conn, server) = opened(simple_query(artist_rows(), b'I')).await;

        let result = conn.execute("SELECT * FROM artists").await.unwrap();
        assert_eq!(result.status(), ResultStatus::TuplesOk);
        assert_eq!(result.row_count(), 1);
        let row = result.row(0).unwrap();
        assert_eq!(row.get::<String>("name").unwrap(), "Josh Rouse");
        assert_eq!(row.get::<i32>("id").unwrap(), 1);

        conn.close().await;
        let received = server.await.unwrap();
        assert_eq!(received[1], (b'Q', b"SELECT * FROM artists\0".to_vec()));
    }

    #[tokio::test]
    async fn test_extended_query_binds_values() {
        let mut reply = vec![parse_complete(), bind_complete()];
        reply.extend(artist_rows());
        reply.push(ready(b'I'));
        let (mut conn, server) = opened(vec![
            Step::Expect(b'P'),
            Step::Expect(b'B'),
            Step::Expect(b'D'),
            Step::Expect(b'E'),
            Step::Expect(b'S'),
            Step::Reply(reply.concat()),
        ])
        .await;

        let result = conn
            .execute_params("SELECT * FROM artists WHERE name = %@", ["Josh Rouse"])
            .await
            .unwrap();
        assert_eq!(result.row_count(), 1);
        conn.close().await;

        let received = server.await.unwrap();
        let parse = &received[1].1;
        assert!(parse.starts_with(b"\0SELECT * FROM artists WHERE name = $1\0"));
        let bind = &received[2].1;
        assert!(bind.windows(10).any(|w| w == b"Josh Rouse"));
    }

    #[tokio::test]
    async fn test_server_error_keeps_connection_usable() {
        let mut steps = simple_query(vec![error_response("42P01", "relation \"nope\" does not exist")], b'I');
        steps.extend(simple_query(vec![command_complete("SELECT 0")], b'I'));
        let (mut conn, _server) = opened(steps).await;

        let err = conn.execute("SELECT * FROM nope").await.unwrap_err();
        assert_eq!(err.code(), Some("42P01"));
        assert_eq!(conn.last_error(), Some("relation \"nope\" does not exist"));
        assert_eq!(conn.status(), ConnectionStatus::Ok);

        let result = conn.execute("SELECT 1 WHERE false").await.unwrap();
        assert_eq!(result.status(), ResultStatus::CommandOk);
    }

    #[tokio::test]
    async fn test_batch_keeps_last_result() {
        let (mut conn, server) = opened(simple_query(
            vec![
                command_complete("INSERT 0 1"),
                command_complete("UPDATE 3"),
            ],
            b'I',
        ))
        .await;

        let insert = QueryComponents::parse("INSERT INTO artists (name) VALUES (%@)", ["AC/DC"]).unwrap();
        let update = QueryComponents::parse("UPDATE artists SET genre = %@", ["rock"]).unwrap();
        let result = conn.execute_batch(&[insert, update]).await.unwrap();
        assert_eq!(result.affected_rows(), 3);
        conn.close().await;

        let received = server.await.unwrap();
        assert_eq!(
            received[1].1,
            b"INSERT INTO artists (name) VALUES ('AC/DC'); UPDATE artists SET genre = 'rock'\0".to_vec()
        );
    }

    #[tokio::test]
    async fn test_error_mid_batch_is_raised() {
        let (mut conn, _server) = opened(simple_query(
            vec![
                command_complete("INSERT 0 1"),
                error_response("23505", "duplicate key value"),
            ],
            b'I',
        ))
        .await;
        let err = conn.execute("INSERT ...; INSERT ...").await.unwrap_err();
        assert_eq!(err.code(), Some("23505"));
        assert_eq!(conn.status(), ConnectionStatus::Ok);
    }

    #[tokio::test]
    async fn test_empty_query() {
        let (mut conn, _server) = opened(simple_query(vec![empty_query()], b'I')).await;
        let result = conn.execute("").await.unwrap();
        assert_eq!(result.status(), ResultStatus::EmptyQuery);
    }

    #[tokio::test]
    async fn test_copy_out_collects_chunks() {
        let (mut conn, _server) = opened(simple_query(
            vec![
                copy_out_response(),
                copy_data("1\tJosh Rouse\n"),
                copy_data("2\tAC/DC\n"),
                copy_done(),
                command_complete("COPY 2"),
            ],
            b'I',
        ))
        .await;
        let result = conn.execute("COPY artists TO STDOUT").await.unwrap();
        assert_eq!(result.status(), ResultStatus::CopyOut);
        assert_eq!(result.copy_data().len(), 2);
        assert_eq!(result.affected_rows(), 2);
    }

    #[tokio::test]
    async fn test_copy_in_is_refused() {
        let (mut conn, server) = opened(vec![
            Step::Expect(b'Q'),
            Step::Reply(copy_in_response()),
            Step::Expect(b'f'),
            Step::Reply([error_response("57014", "COPY from stdin failed"), ready(b'I')].concat()),
        ])
        .await;
        let err = conn.execute("COPY artists FROM STDIN").await.unwrap_err();
        assert_eq!(err.code(), Some("57014"));
        assert_eq!(conn.status(), ConnectionStatus::Ok);
        conn.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_message_accepted_by_default() {
        let (mut conn, _server) = opened(simple_query(vec![msg(b'~', &[])], b'I')).await;
        let result = conn.execute("SELECT 1").await.unwrap();
        assert_eq!(result.status(), ResultStatus::Unknown);
    }

    #[tokio::test]
    async fn test_unknown_message_inside_rows_is_skipped() {
        let reply = vec![
            row_description(&[("id", oid::INT4), ("name", oid::TEXT), ("genre", oid::TEXT)]),
            data_row(&[Some("1"), Some("Josh Rouse"), Some("Country")]),
            msg(b'~', &[]),
            data_row(&[Some("2"), Some("AC/DC"), Some("Rock")]),
            command_complete("SELECT 2"),
        ];
        let (mut conn, _server) = opened(simple_query(reply, b'I')).await;
        let result = conn.execute("SELECT * FROM artists").await.unwrap();
        assert_eq!(result.status(), ResultStatus::TuplesOk);
        assert_eq!(result.row_count(), 2);
        let names: Vec<String> = result.iter().map(|row| row.get("name").unwrap()).collect();
        assert_eq!(names, vec!["Josh Rouse".to_string(), "AC/DC".to_string()]);
        assert_eq!(conn.status(), ConnectionStatus::Ok);
    }

    #[tokio::test]
    async fn test_hangup_mid_result_breaks_connection() {
        let (mut conn, _server) = opened(vec![
            Step::Expect(b'Q'),
            Step::Reply(
                [
                    row_description(&[("id", oid::INT4), ("name", oid::TEXT), ("genre", oid::TEXT)]),
                    data_row(&[Some("1"), Some("Josh Rouse"), Some("Country")]),
                ]
                .concat(),
            ),
            Step::Hangup,
        ])
        .await;
        assert!(conn.execute("SELECT * FROM artists").await.is_err());
        assert_eq!(conn.status(), ConnectionStatus::Bad);
        assert!(conn.execute("SELECT 1").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_message_rejected_by_policy() {
        let (mut conn, _server) = opened(simple_query(vec![msg(b'~', &[])], b'I')).await;
        conn.settings_mut().unknown_status = UnknownStatusPolicy::Reject;
        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, PgError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_statement_is_logged() {
        let (mut conn, _server) = opened(simple_query(vec![command_complete("SELECT 0")], b'I')).await;
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        conn.set_logger(Arc::new(move |sql: &str| sink.lock().unwrap().push(sql.to_string())));

        conn.execute("SELECT 1 WHERE false").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["SELECT 1 WHERE false".to_string()]);
    }

    #[tokio::test]
    async fn test_nul_in_value_is_not_sent() {
        let (mut conn, _server) = opened(vec![]).await;
        let err = conn
            .execute_params("SELECT $1", ["bad\0value"])
            .await
            .unwrap_err();
        assert!(matches!(err, PgError::Encode(_)));
        assert_eq!(conn.status(), ConnectionStatus::Ok);
    }

    #[tokio::test]
    async fn test_deadline_after_dispatch_closes_connection() {
        let (mut conn, _server) = opened(vec![Step::Expect(b'Q'), Step::Stall(Duration::from_secs(5))]).await;
        let err = conn
            .execute_with_deadline("SELECT pg_sleep(10)", Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PgError::Timeout(_)));
        assert_eq!(conn.status(), ConnectionStatus::Bad);
        assert!(matches!(conn.execute("SELECT 1").await, Err(PgError::NotReady(ConnectionStatus::Bad))));
    }

    #[tokio::test]
    async fn test_dropped_future_breaks_connection() {
        let (mut conn, _server) = opened(vec![Step::Expect(b'Q'), Step::Stall(Duration::from_secs(5))]).await;
        let _ = tokio::time::timeout(Duration::from_millis(50), conn.execute("SELECT pg_sleep(10)")).await;
        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, PgError::Broken(_)));
        assert_eq!(conn.status(), ConnectionStatus::Bad);
    }

    #[tokio::test]
    async fn test_streaming_results() {
        let (mut conn, _server) = opened(simple_query(
            vec![command_complete("CREATE TABLE"), command_complete("INSERT 0 2")],
            b'I',
        ))
        .await;
        conn.send_query(&QueryComponents::from_sql("CREATE TABLE t (x int); INSERT INTO t VALUES (1), (2)"))
            .await
            .unwrap();
        assert!(matches!(conn.execute("SELECT 1").await, Err(PgError::Busy)));

        let first = conn.get_result().await.unwrap().unwrap();
        assert_eq!(first.command_tag(), Some("CREATE TABLE"));
        let second = conn.get_result().await.unwrap().unwrap();
        assert_eq!(second.affected_rows(), 2);
        assert!(conn.get_result().await.unwrap().is_none());
        assert!(conn.get_result().await.unwrap().is_none());
    }
}
