use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::enums::GroupConnection;
use crate::error::RooletError;
use crate::session::Session;
use crate::wire::{Answer, Command, FrameBuilder};

const READ_CHUNK: usize = 4096;

/// Owns the TCP socket and drives the two-step handshake (`spec.md` §4.4).
///
/// [`Connection::request`] is a synchronous (one in flight) primitive legal
/// only during the handshake; once the session reaches Active, the
/// [`crate::dispatcher::Dispatcher`] owns all socket I/O.
pub struct Connection {
    stream: TcpStream,
    frame: FrameBuilder,
    next_id: u64,
}

impl Connection {
    pub async fn connect(addr: &str, port: u16) -> Result<Self, RooletError> {
        let stream = TcpStream::connect((addr, port))
            .await
            .map_err(|_| RooletError::ConnectionRefused {
                addr: addr.to_string(),
                port,
            })?;
        Ok(Self {
            stream,
            frame: FrameBuilder::new(),
            next_id: 1,
        })
    }

    /// Retries `connect` on refusal, honoring `reconnect_delay` and the
    /// shared shutdown flag (`spec.md` §4.4, §5: "Reconnect attempts honor
    /// `active`; on shutdown the reconnect loop exits instead of sleeping").
    pub async fn connect_with_retry(
        config: &Configuration,
        active: &Arc<AtomicBool>,
    ) -> Result<Self, RooletError> {
        loop {
            match Self::connect(&config.addr, config.port).await {
                Ok(connection) => return Ok(connection),
                Err(err @ RooletError::ConnectionRefused { .. }) => {
                    if !config.reconnect_enabled() || !active.load(Ordering::SeqCst) {
                        return Err(err);
                    }
                    warn!(addr = %config.addr, port = config.port, "connection refused, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs_f64(config.reconnect_delay))
                        .await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Writes `command` and reads until one `Answer` frame completes.
    pub async fn request(&mut self, command: &Command) -> Result<Answer, RooletError> {
        self.write_frame(&command.to_wire()).await?;
        self.read_answer().await
    }

    pub async fn write_frame(&mut self, value: &Value) -> Result<(), RooletError> {
        let mut line = value.to_string();
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .await
            .map_err(RooletError::Io)
    }

    async fn read_answer(&mut self) -> Result<Answer, RooletError> {
        let value = self.read_frame().await?;
        Answer::from_wire(&value)
    }

    /// Reads socket bytes into the [`FrameBuilder`] until one frame
    /// completes; used both here and by the Dispatcher's network loop.
    ///
    /// Drains the builder with `take()` before issuing another socket read,
    /// so a single read that pipelined several frames onto the wire (e.g. a
    /// `progress` immediately followed by a `result`) is drained one frame
    /// per call instead of blocking on a read that isn't needed yet.
    pub async fn read_frame(&mut self) -> Result<Value, RooletError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(value) = self.frame.take()? {
                return Ok(value);
            }
            let n = self
                .stream
                .read(&mut buf)
                .await
                .map_err(RooletError::Io)?;
            if n == 0 {
                return Err(RooletError::Protocol(
                    "connection closed by broker".to_string(),
                ));
            }
            let chunk = std::str::from_utf8(&buf[..n])
                .map_err(|err| RooletError::Protocol(format!("invalid utf-8 on wire: {err}")))?;
            self.frame.append(chunk)?;
        }
    }

    /// Runs the auth + registration handshake in order (`spec.md` §4.4).
    pub async fn handshake(
        &mut self,
        session: &mut Session,
        token: &str,
        pub_key_name: &str,
        group: GroupConnection,
        metadata: Value,
    ) -> Result<(), RooletError> {
        self.authenticate(session, token, pub_key_name).await?;
        self.register(session, group, metadata).await
    }

    async fn authenticate(
        &mut self,
        session: &mut Session,
        token: &str,
        pub_key_name: &str,
    ) -> Result<(), RooletError> {
        session.enter_authenticating();

        let mut command = Command::new(self.allocate_id(), "auth");
        // `params.data` carries the token verbatim (`spec.md` §4.4), not
        // base64-encoded.
        command.data = token.as_bytes().to_vec();
        command.data_is_text = true;
        command.json = Some(json!({ "key": pub_key_name }));

        let answer = self.request(&command).await?;
        if let Some(error) = answer.error {
            return Err(RooletError::Handshake(error));
        }

        let auth = answer
            .result
            .as_json()
            .and_then(|value| value.get("auth"))
            .and_then(Value::as_bool);

        match auth {
            Some(true) => {
                session.token_issued();
                debug!("authentication accepted");
                Ok(())
            }
            Some(false) => Err(RooletError::AuthRefused),
            None => Err(RooletError::Protocol(
                "auth reply missing boolean 'auth' field".to_string(),
            )),
        }
    }

    async fn register(
        &mut self,
        session: &mut Session,
        group: GroupConnection,
        metadata: Value,
    ) -> Result<(), RooletError> {
        session.enter_registering();

        let mut payload = json!({ "group": group.value() });
        if let (Some(payload_map), Some(metadata_map)) =
            (payload.as_object_mut(), metadata.as_object())
        {
            for (key, value) in metadata_map {
                payload_map.insert(key.clone(), value.clone());
            }
        }

        let mut command = Command::new(self.allocate_id(), "registration");
        command.cid = session.cid().unwrap_or_default().to_string();
        command.json = Some(payload);

        let answer = self.request(&command).await?;
        if let Some(error) = answer.error {
            return Err(RooletError::Handshake(error));
        }

        let body = answer.result.as_json();
        let ok = body
            .and_then(|value| value.get("ok"))
            .and_then(Value::as_bool);
        let cid = body
            .and_then(|value| value.get("cid"))
            .and_then(Value::as_str);

        match (ok, cid) {
            (Some(true), Some(cid)) => {
                session.activate(cid);
                debug!(cid, "registration accepted");
                Ok(())
            }
            _ => Err(RooletError::Protocol(
                "unexpected registration reply shape".to_string(),
            )),
        }
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}
