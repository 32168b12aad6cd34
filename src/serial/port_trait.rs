//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::SerialStream;

/// Trait for the transmit half of a serial port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Release the port
    async fn close(&mut self) -> io::Result<()>;
}

/// Trait for the receive half of a serial port
#[async_trait]
pub trait SerialPortRead: Send {
    /// Read whatever is available into `buf`, returning the byte count
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write half of a `tokio_serial::SerialStream`
pub struct TokioSerialPort {
    port: WriteHalf<SerialStream>,
}

impl TokioSerialPort {
    pub fn new(port: WriteHalf<SerialStream>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.shutdown().await
    }
}

/// Read half of a `tokio_serial::SerialStream`
pub struct TokioSerialReader {
    port: ReadHalf<SerialStream>,
}

impl TokioSerialReader {
    pub fn new(port: ReadHalf<SerialStream>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortRead for TokioSerialReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.port.read(buf).await
    }
}
