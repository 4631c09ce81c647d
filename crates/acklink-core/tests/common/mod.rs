//! Scripted in-memory transport for controller tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use acklink_core::protocol::{
    Channel, DataReceivedHandler, Frame, FrameBuilder, PortSettings, ProtocolError, Transport,
};

/// Produces the reply chunks for the n-th write (1-based) of `bytes`
pub type Responder = Box<dyn Fn(usize, &[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// Device-side state shared by the transport, its channels and the test
#[derive(Default)]
pub struct MockDevice {
    pub ports: Mutex<Vec<String>>,
    pub open_error: Mutex<Option<String>>,
    pub opened_with: Mutex<Vec<PortSettings>>,
    pub written: Mutex<Vec<Vec<u8>>>,
    pub inbound: Mutex<VecDeque<u8>>,
    pub handler: Mutex<Option<DataReceivedHandler>>,
    pub open: AtomicBool,
    pub writes: AtomicUsize,
    pub responder: Mutex<Option<Responder>>,
    pub reply_delay_ms: Mutex<u64>,
}

impl MockDevice {
    pub fn new(ports: &[&str]) -> Arc<Self> {
        let device = Self::default();
        *device.ports.lock().unwrap() = ports.iter().map(|p| p.to_string()).collect();
        *device.reply_delay_ms.lock().unwrap() = 5;
        Arc::new(device)
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(usize, &[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Reply to every write with `reply`, split into `chunk` sized fragments
    pub fn reply_always(&self, reply: Vec<u8>, chunk: usize) {
        self.set_responder(move |_, _| reply.chunks(chunk).map(|c| c.to_vec()).collect());
    }

    /// Queue inbound bytes and fire the data-received handler on this thread
    pub fn deliver(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().extend(bytes.iter().copied());
        let handler = self.handler.lock().unwrap().clone();
        if let Some(on_data) = handler {
            on_data();
        }
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }
}

pub struct MockTransport {
    pub device: Arc<MockDevice>,
}

impl MockTransport {
    pub fn new(device: &Arc<MockDevice>) -> Self {
        Self {
            device: Arc::clone(device),
        }
    }
}

impl Transport for MockTransport {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn Channel>, ProtocolError> {
        if let Some(message) = self.device.open_error.lock().unwrap().clone() {
            return Err(ProtocolError::SerialError(message));
        }
        if !self.device.ports.lock().unwrap().contains(&settings.port_name) {
            return Err(ProtocolError::PortNotFound(settings.port_name.clone()));
        }
        self.device.opened_with.lock().unwrap().push(settings.clone());
        self.device.open.store(true, Ordering::SeqCst);
        Ok(Box::new(MockChannel {
            device: Arc::clone(&self.device),
        }))
    }

    fn list_port_names(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self.device.ports.lock().unwrap().clone())
    }
}

pub struct MockChannel {
    device: Arc<MockDevice>,
}

impl Channel for MockChannel {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        self.device.written.lock().unwrap().push(bytes.to_vec());
        let n = self.device.writes.fetch_add(1, Ordering::SeqCst) + 1;

        let chunks = match self.device.responder.lock().unwrap().as_ref() {
            Some(responder) => responder(n, bytes),
            None => Vec::new(),
        };
        if chunks.is_empty() {
            return Ok(());
        }

        // Reply from another thread, the way a driver callback would
        let device = Arc::clone(&self.device);
        let delay = Duration::from_millis(*device.reply_delay_ms.lock().unwrap());
        thread::spawn(move || {
            for chunk in chunks {
                thread::sleep(delay);
                device.deliver(&chunk);
            }
        });
        Ok(())
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.device.inbound.lock().unwrap().drain(..).collect())
    }

    fn is_open(&self) -> bool {
        self.device.open.load(Ordering::SeqCst)
    }

    fn set_data_received(&mut self, handler: Option<DataReceivedHandler>) {
        *self.device.handler.lock().unwrap() = handler;
    }

    fn close(&mut self) {
        self.device.open.store(false, Ordering::SeqCst);
        *self.device.handler.lock().unwrap() = None;
    }
}

/// A reply frame carrying `data`
pub fn reply_frame(data: &[u8]) -> Frame {
    FrameBuilder::new()
        .control(0x91)
        .bytes(data)
        .build()
        .expect("reply frame")
}

/// Collects published values for later assertions
pub fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value: &T| sink.lock().unwrap().push(value.clone()))
}
