//! Serial port handling
//!
//! [`SerialTransport`] opens ports through the `serialport` crate. Since the
//! driver offers no data-received event, each [`SerialChannel`] runs a small
//! watcher thread that polls the receive queue and fires the registered
//! handler whenever bytes are waiting.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::channel::{Channel, DataReceivedHandler, Transport};
use super::{LinkConfig, Parity, PortSettings, ProtocolError};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key placing USB CDC adapters first, then USB serial, then the rest.
/// Numeric suffixes sort numerically so ttyUSB10 follows ttyUSB9.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        if let Ok(num) = rest.parse::<usize>() {
            return (2, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let p = PortInfo::from(info);
                map.entry(p.name.clone()).or_insert(p);
            }
        }
        Err(e) => warn!("list_ports: enumeration failed: {}", e),
    }

    // The udev-less enumeration misses some adapters
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, ProtocolError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(ProtocolError::Unsupported(format!("{} data bits", other))),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity, ProtocolError> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        other => Err(ProtocolError::Unsupported(format!("{:?} parity", other))),
    }
}

fn stop_bits(bits: u8) -> Result<serialport::StopBits, ProtocolError> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(ProtocolError::Unsupported(format!("{} stop bits", other))),
    }
}

/// Transport backed by the system's serial ports
#[derive(Debug, Clone)]
pub struct SerialTransport {
    poll_interval: Duration,
}

impl SerialTransport {
    /// Create a transport whose channels poll for inbound data every `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Create a transport polling at `config.poll_interval_ms`
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.poll_interval())
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}

impl Transport for SerialTransport {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn Channel>, ProtocolError> {
        let mut port = serialport::new(&settings.port_name, settings.baud_rate)
            .data_bits(data_bits(settings.data_bits)?)
            .parity(parity(settings.parity)?)
            .stop_bits(stop_bits(settings.stop_bits)?)
            .flow_control(serialport::FlowControl::None)
            // Short timeout keeps reads responsive; callers only read what is queued
            .timeout(Duration::from_millis(100))
            .open()?;

        // RS-485 adapters powered from the control lines need DTR/RTS asserted
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!("open: failed to set DTR high: {} (continuing)", e);
        }
        if let Err(e) = port.write_request_to_send(true) {
            debug!("open: failed to set RTS high: {} (continuing)", e);
        }
        port.clear(serialport::ClearBuffer::All)?;

        info!(
            "Opened {} at {} baud ({}{:?}{})",
            settings.port_name,
            settings.baud_rate,
            settings.data_bits,
            settings.parity,
            settings.stop_bits
        );

        Ok(Box::new(SerialChannel::new(port, self.poll_interval)))
    }

    fn list_port_names(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(list_ports().into_iter().map(|p| p.name).collect())
    }
}

type SharedHandler = Arc<Mutex<Option<DataReceivedHandler>>>;

struct Watcher {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Watcher {
    /// Poll `pending` every `interval` and fire the handler while bytes wait.
    ///
    /// A failed poll clears `alive` and ends the thread.
    fn spawn<P>(
        mut pending: P,
        handler: SharedHandler,
        alive: Arc<AtomicBool>,
        interval: Duration,
    ) -> io::Result<Self>
    where
        P: FnMut() -> serialport::Result<u32> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("acklink-serial-watcher".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    match pending() {
                        Ok(n) if n > 0 => {
                            let current = handler
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .clone();
                            if let Some(on_data) = current {
                                on_data();
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("serial watcher: link lost: {}", e);
                            alive.store(false, Ordering::Release);
                            break;
                        }
                    }
                    thread::sleep(interval);
                }
            })?;

        Ok(Self { running, handle })
    }

    fn stop(self) {
        self.running.store(false, Ordering::Release);
        // The handler may close the channel from the watcher thread itself
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

/// Serial port wrapper implementing [`Channel`]
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    handler: SharedHandler,
    watcher: Option<Watcher>,
    alive: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl SerialChannel {
    /// Wrap an already-open port
    pub fn new(port: Box<dyn SerialPort>, poll_interval: Duration) -> Self {
        Self {
            port: Some(port),
            handler: Arc::new(Mutex::new(None)),
            watcher: None,
            alive: Arc::new(AtomicBool::new(true)),
            poll_interval,
        }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
    }
}

impl Channel for SerialChannel {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let port = self.port()?;
        let available = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; available];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some() && self.alive.load(Ordering::Acquire)
    }

    fn set_data_received(&mut self, handler: Option<DataReceivedHandler>) {
        let install = handler.is_some();
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = handler;

        if !install {
            self.stop_watcher();
            return;
        }
        if self.watcher.is_some() {
            return;
        }

        let interval = self.poll_interval;
        let handler = Arc::clone(&self.handler);
        let alive = Arc::clone(&self.alive);
        let monitor = match self.port().and_then(|p| p.try_clone().map_err(io::Error::from)) {
            Ok(monitor) => monitor,
            Err(e) => {
                warn!("serial channel: cannot watch for inbound data: {}", e);
                return;
            }
        };
        match Watcher::spawn(move || monitor.bytes_to_read(), handler, alive, interval) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => warn!("serial channel: failed to start watcher: {}", e),
        }
    }

    fn close(&mut self) {
        self.stop_watcher();
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if self.port.take().is_some() {
            debug!("serial channel closed");
        }
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}
