//! Modbus TCP transport
//!
//! One `TcpStream` per transport, one outstanding request at a time. Every
//! I/O step runs under the configured timeout. Any failure that may have left
//! bytes in flight drops the stream; only clean exception replies keep it.
//! A transaction whose future was dropped between request and reply marks
//! the stream unusable, and the next `connect` replaces it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::constants::{
    DEFAULT_MODBUS_PORT, DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID, MAX_MBAP_LENGTH, MBAP_HEADER_LEN,
    MODBUS_MAX_READ_COILS, MODBUS_MAX_READ_REGISTERS, MODBUS_PROTOCOL_ID,
};
use super::pdu::{build_read_request, parse_bits_response, parse_words_response, ModbusPdu};
use super::{BitTable, Transport, TransportError, WordTable};

/// TCP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Connect and per-transaction timeout
    pub timeout: Duration,
    /// Largest register chunk per FC03/FC04 request
    pub max_read_registers: u16,
    /// Largest bit chunk per FC01/FC02 request
    pub max_read_coils: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MODBUS_PORT,
            unit_id: DEFAULT_UNIT_ID,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_read_registers: MODBUS_MAX_READ_REGISTERS,
            max_read_coils: MODBUS_MAX_READ_COILS,
        }
    }
}

impl TcpConfig {
    fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Modbus TCP client session
#[derive(Debug)]
pub struct ModbusTcpTransport {
    config: TcpConfig,
    stream: Option<TcpStream>,
    transaction_id: u16,
    /// Set from request write until the reply body is read
    in_flight: bool,
}

impl ModbusTcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            stream: None,
            transaction_id: 0,
            in_flight: false,
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Send one request and wait for its reply
    ///
    /// The stream is dropped on every error path except a parsed reply.
    async fn transact(&mut self, request: &ModbusPdu) -> Result<ModbusPdu, TransportError> {
        let result = self.exchange(request).await;
        self.in_flight = false;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    /// Drop the stream unless `err` left it in sync
    fn discard_on_fault(&mut self, err: TransportError) -> TransportError {
        if !err.leaves_session_clean() {
            self.stream = None;
        }
        err
    }

    async fn exchange(&mut self, request: &ModbusPdu) -> Result<ModbusPdu, TransportError> {
        let transaction_id = self.next_transaction_id();
        let unit_id = self.config.unit_id;
        let io_timeout = self.config.timeout;
        if self.in_flight {
            self.stream = None;
        }
        let stream = self.stream.as_mut().ok_or_else(TransportError::not_connected)?;

        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + request.len());
        frame.put_u16(transaction_id);
        frame.put_u16(MODBUS_PROTOCOL_ID);
        frame.put_u16(request.len() as u16 + 1);
        frame.put_u8(unit_id);
        frame.put_slice(request.as_slice());

        debug!("TX tid={} {:02X?}", transaction_id, frame.as_ref());

        self.in_flight = true;
        timeout(io_timeout, stream.write_all(&frame))
            .await
            .map_err(|_| TransportError::Timeout(io_timeout))??;

        let mut header = [0u8; MBAP_HEADER_LEN];
        timeout(io_timeout, stream.read_exact(&mut header))
            .await
            .map_err(|_| TransportError::Timeout(io_timeout))??;

        let rx_tid = u16::from_be_bytes([header[0], header[1]]);
        let protocol_id = u16::from_be_bytes([header[2], header[3]]);
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let rx_unit = header[6];

        if protocol_id != MODBUS_PROTOCOL_ID {
            return Err(TransportError::Malformed(format!(
                "protocol id {protocol_id}"
            )));
        }
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(TransportError::Malformed(format!(
                "MBAP length {length} out of range"
            )));
        }
        if rx_tid != transaction_id {
            return Err(TransportError::Malformed(format!(
                "transaction id mismatch: sent {transaction_id}, got {rx_tid}"
            )));
        }
        if rx_unit != unit_id {
            warn!("Reply from unit {} (expected {})", rx_unit, unit_id);
        }

        let mut body = vec![0u8; length - 1];
        timeout(io_timeout, stream.read_exact(&mut body))
            .await
            .map_err(|_| TransportError::Timeout(io_timeout))??;

        debug!("RX tid={} {:02X?}", rx_tid, body);

        ModbusPdu::from_slice(&body)
    }
}

#[async_trait]
impl Transport for ModbusTcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.in_flight {
            warn!(
                "Discarding interrupted transaction {} on {}",
                self.transaction_id,
                self.endpoint()
            );
            self.stream = None;
            self.in_flight = false;
        }
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self.config.socket_addr();
        debug!("Connecting to {}", addr);

        let stream = match timeout(self.config.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::Connection(format!("{addr}: {e}")));
            },
            Err(_) => return Err(TransportError::Timeout(self.config.timeout)),
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        info!("Connected to {}", self.endpoint());
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) {
        self.in_flight = false;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Socket shutdown: {}", e);
            }
            debug!("Disconnected from {}", self.endpoint());
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.in_flight
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.config.host, self.config.port, self.config.unit_id
        )
    }

    async fn read_bits(
        &mut self,
        table: BitTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError> {
        let fc = table.function_code();
        let max_chunk = self.config.max_read_coils.clamp(1, MODBUS_MAX_READ_COILS);
        let mut bits = Vec::with_capacity(count as usize);
        let mut offset: u32 = 0;

        while offset < count as u32 {
            let chunk_start = (start as u32 + offset) as u16;
            let chunk_len = (count as u32 - offset).min(max_chunk as u32) as u16;

            debug!(
                "Reading {} chunk: start={}, count={} ({}/{})",
                table, chunk_start, chunk_len, offset, count
            );

            let request = build_read_request(fc, chunk_start, chunk_len)?;
            let reply = self.transact(&request).await?;
            let chunk = parse_bits_response(&reply, fc, chunk_len)
                .map_err(|e| self.discard_on_fault(e))?;

            let short = chunk.len() < chunk_len as usize;
            offset += chunk.len() as u32;
            bits.extend(chunk);
            if short {
                debug!("Short {} reply at {}, stopping", table, chunk_start);
                break;
            }
        }

        Ok(bits)
    }

    async fn read_words(
        &mut self,
        table: WordTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let fc = table.function_code();
        let max_chunk = self
            .config
            .max_read_registers
            .clamp(1, MODBUS_MAX_READ_REGISTERS);
        let mut words = Vec::with_capacity(count as usize);
        let mut offset: u32 = 0;

        while offset < count as u32 {
            let chunk_start = (start as u32 + offset) as u16;
            let chunk_len = (count as u32 - offset).min(max_chunk as u32) as u16;

            debug!(
                "Reading {} chunk: start={}, count={} ({}/{})",
                table, chunk_start, chunk_len, offset, count
            );

            let request = build_read_request(fc, chunk_start, chunk_len)?;
            let reply = self.transact(&request).await?;
            let chunk = parse_words_response(&reply, fc, chunk_len)
                .map_err(|e| self.discard_on_fault(e))?;

            let short = chunk.len() < chunk_len as usize;
            offset += chunk.len() as u32;
            words.extend(chunk);
            if short {
                debug!("Short {} reply at {}, stopping", table, chunk_start);
                break;
            }
        }

        Ok(words)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serve FC03 requests with register value = address, one connection
    async fn spawn_register_echo(listener: TcpListener) {
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            loop {
                let mut header = [0u8; MBAP_HEADER_LEN];
                if socket.read_exact(&mut header).await.is_err() {
                    return;
                }
                let len = u16::from_be_bytes([header[4], header[5]]) as usize;
                let mut pdu = vec![0u8; len - 1];
                socket.read_exact(&mut pdu).await.unwrap();

                let start = u16::from_be_bytes([pdu[1], pdu[2]]);
                let qty = u16::from_be_bytes([pdu[3], pdu[4]]);

                let mut reply = vec![pdu[0], (qty * 2) as u8];
                for addr in start..start + qty {
                    reply.extend_from_slice(&addr.to_be_bytes());
                }
                let mut frame = header[..4].to_vec();
                frame.extend_from_slice(&(reply.len() as u16 + 1).to_be_bytes());
                frame.push(header[6]);
                frame.extend_from_slice(&reply);
                socket.write_all(&frame).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_chunked_register_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        spawn_register_echo(listener).await;

        let mut transport = ModbusTcpTransport::new(TcpConfig {
            port,
            max_read_registers: 10,
            ..Default::default()
        });
        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        let words = transport
            .read_words(WordTable::HoldingRegisters, 100, 25)
            .await
            .unwrap();
        assert_eq!(words.len(), 25);
        assert_eq!(words[0], 100);
        assert_eq!(words[24], 124);

        transport.close().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_read_without_connect() {
        let mut transport = ModbusTcpTransport::new(TcpConfig::default());
        let err = transport
            .read_bits(BitTable::Coils, 0, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_dropped_read_invalidates_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = ModbusTcpTransport::new(TcpConfig {
            port,
            timeout: Duration::from_secs(2),
            ..Default::default()
        });
        transport.connect().await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            transport.read_words(WordTable::HoldingRegisters, 0, 1),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!transport.is_connected());

        let err = transport
            .read_words(WordTable::HoldingRegisters, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out_and_drops_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = ModbusTcpTransport::new(TcpConfig {
            port,
            timeout: Duration::from_millis(100),
            ..Default::default()
        });
        transport.connect().await.unwrap();

        let err = transport
            .read_words(WordTable::HoldingRegisters, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(!transport.is_connected());
    }
}
