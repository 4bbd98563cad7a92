//! In-memory device for tests and dry runs
//!
//! `MockTransport` is a cheap handle: clones share one device image, so a test
//! can hand one clone to a session and keep another to script the device and
//! inspect the requests it received.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BitTable, Transport, TransportError, WordTable};

/// One request as seen by the mock device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRecord {
    pub function: u8,
    pub start: u16,
    pub count: u16,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    refuse_connect: bool,
    connects: usize,
    bits: HashMap<BitTable, Vec<bool>>,
    words: HashMap<WordTable, Vec<u16>>,
    bit_samples: VecDeque<Vec<bool>>,
    /// Pending failures, optionally restricted to one function code
    failures: VecDeque<(Option<u8>, TransportError)>,
    reads: Vec<ReadRecord>,
}

impl MockState {
    /// Common preamble for every read: session check, record, injected failure
    fn begin_read(&mut self, function: u8, start: u16, count: u16) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::not_connected());
        }
        self.reads.push(ReadRecord {
            function,
            start,
            count,
        });
        let pending = self
            .failures
            .iter()
            .position(|(only, _)| only.map_or(true, |fc| fc == function));
        if let Some((_, err)) = pending.and_then(|idx| self.failures.remove(idx)) {
            if !err.leaves_session_clean() {
                self.connected = false;
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Scripted Modbus device
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one bit in the device image, growing it as needed
    pub fn set_bit(&self, table: BitTable, address: u16, value: bool) {
        let mut state = self.state.lock();
        let image = state.bits.entry(table).or_default();
        let idx = address as usize;
        if image.len() <= idx {
            image.resize(idx + 1, false);
        }
        image[idx] = value;
    }

    /// Write consecutive registers into the device image, growing it as needed
    pub fn set_words(&self, table: WordTable, address: u16, values: &[u16]) {
        let mut state = self.state.lock();
        let image = state.words.entry(table).or_default();
        let first = address as usize;
        let end = first + values.len();
        if image.len() < end {
            image.resize(end, 0);
        }
        image[first..end].copy_from_slice(values);
    }

    /// Queue a whole bit sample returned by the next bit read, ignoring the image
    pub fn push_bit_sample(&self, sample: Vec<bool>) {
        self.state.lock().bit_samples.push_back(sample);
    }

    /// Make the next read fail with `err`
    ///
    /// Errors other than exceptions also drop the mock session.
    pub fn fail_next(&self, err: TransportError) {
        self.state.lock().failures.push_back((None, err));
    }

    /// Make the next read with `function` fail with `err`
    pub fn fail_next_on(&self, function: u8, err: TransportError) {
        self.state.lock().failures.push_back((Some(function), err));
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.state.lock().refuse_connect = refuse;
    }

    /// Requests received so far
    pub fn reads(&self) -> Vec<ReadRecord> {
        self.state.lock().reads.clone()
    }

    /// Successful connects so far
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.connected {
            return Ok(());
        }
        if state.refuse_connect {
            return Err(TransportError::Connection(
                "mock: connection refused".to_string(),
            ));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }

    async fn read_bits(
        &mut self,
        table: BitTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError> {
        let mut state = self.state.lock();
        state.begin_read(table.function_code(), start, count)?;

        if let Some(sample) = state.bit_samples.pop_front() {
            return Ok(sample);
        }

        let image = state.bits.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        let first = (start as usize).min(image.len());
        let end = (start as usize + count as usize).min(image.len());
        Ok(image[first..end].to_vec())
    }

    async fn read_words(
        &mut self,
        table: WordTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut state = self.state.lock();
        state.begin_read(table.function_code(), start, count)?;

        let image = state.words.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        let first = (start as usize).min(image.len());
        let end = (start as usize + count as usize).min(image.len());
        Ok(image[first..end].to_vec())
    }
}
