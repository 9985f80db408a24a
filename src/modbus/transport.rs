//! # Modbus Transport
//!
//! Async request/response exchange over TCP (MBAP) and serial RTU, and the
//! blocking [`ModbusDriver`] seam the adapter talks to.
//!
//! The adapter contract is synchronous. [`ClientDriver`] owns a private
//! current-thread tokio runtime and drives the async transport with
//! `block_on`, so no runtime crosses the plugin boundary.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace, warn};

use crate::error::{ModbusError, ModbusResult};

use super::constants::*;
use super::frame;
use super::settings::{Connection, ModbusConfig};

fn timeout_error(timeout: Duration) -> ModbusError {
    ModbusError::Timeout {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Modbus TCP over any byte stream.
///
/// A failed exchange can leave part of a response in the stream. The
/// transport then refuses further requests until it is replaced.
pub struct TcpTransport<S> {
    stream: S,
    unit_id: u8,
    transaction_id: u16,
    timeout: Duration,
    desynced: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TcpTransport<S> {
    pub fn new(stream: S, unit_id: u8, timeout: Duration) -> Self {
        Self {
            stream,
            unit_id,
            transaction_id: 0,
            timeout,
            desynced: false,
        }
    }

    /// Whether a failed exchange left the stream at an unknown frame offset.
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// Send a request PDU and return the response PDU.
    ///
    /// Responses carrying a stale transaction id are discarded.
    pub async fn request(&mut self, pdu: &[u8]) -> ModbusResult<Vec<u8>> {
        if self.desynced {
            return Err(ModbusError::connection("TCP stream out of sync"));
        }
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let transaction_id = self.transaction_id;
        let request = frame::encode_tcp_frame(transaction_id, self.unit_id, pdu);
        trace!(transaction_id, bytes = request.len(), "TCP request");

        let result = tokio::time::timeout(self.timeout, self.exchange(&request, transaction_id))
            .await
            .map_err(|_| timeout_error(self.timeout))
            .and_then(|response| response);
        if let Err(e) = &result {
            warn!(transaction_id, error = %e, "TCP exchange failed, stream out of sync");
            self.desynced = true;
        }
        result
    }

    async fn exchange(&mut self, request: &[u8], transaction_id: u16) -> ModbusResult<Vec<u8>> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;
        loop {
            let mut header = [0u8; MBAP_HEADER_LEN + 1];
            self.stream.read_exact(&mut header).await?;
            let mbap = frame::decode_tcp_header(&header)?;

            let mut body = vec![0u8; mbap.pdu_len()];
            self.stream.read_exact(&mut body).await?;

            if mbap.transaction_id != transaction_id {
                debug!(
                    expected = transaction_id,
                    got = mbap.transaction_id,
                    "discarding stale TCP response"
                );
                continue;
            }
            if mbap.unit_id != self.unit_id {
                return Err(ModbusError::protocol(format!(
                    "unit id mismatch: expected {}, got {}",
                    self.unit_id, mbap.unit_id
                )));
            }
            return Ok(body);
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

// ============================================================================
// RTU
// ============================================================================

/// Modbus RTU over any byte stream (normally a serial port).
pub struct RtuTransport<S> {
    port: S,
    slave_id: u8,
    timeout: Duration,
    desynced: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RtuTransport<S> {
    pub fn new(port: S, slave_id: u8, timeout: Duration) -> Self {
        Self {
            port,
            slave_id,
            timeout,
            desynced: false,
        }
    }

    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    pub async fn request(&mut self, pdu: &[u8]) -> ModbusResult<Vec<u8>> {
        if self.desynced {
            return Err(ModbusError::connection("serial line out of sync"));
        }
        let request = frame::encode_rtu_frame(self.slave_id, pdu);
        trace!(slave_id = self.slave_id, bytes = request.len(), "RTU request");

        let result = tokio::time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| timeout_error(self.timeout))
            .and_then(|response| response);
        if let Err(e) = &result {
            warn!(slave_id = self.slave_id, error = %e, "RTU exchange failed, line out of sync");
            self.desynced = true;
        }
        result
    }

    async fn exchange(&mut self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        self.port.write_all(request).await?;
        self.port.flush().await?;

        let mut response = vec![0u8; 3];
        self.port.read_exact(&mut response).await?;
        let total = frame::rtu_response_len(&response)?;
        response.resize(total, 0);
        self.port.read_exact(&mut response[3..]).await?;

        frame::decode_rtu_frame(&response, self.slave_id).map(<[u8]>::to_vec)
    }

    pub async fn shutdown(&mut self) {
        let _ = self.port.shutdown().await;
    }
}

// ============================================================================
// Driver seam
// ============================================================================

/// Blocking Modbus master operations used by the adapter.
pub trait ModbusDriver: Send {
    fn connect(&mut self) -> ModbusResult<()>;
    fn close(&mut self);
    fn read_coils(&mut self, address: u16, count: u16) -> ModbusResult<Vec<bool>>;
    fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ModbusResult<Vec<bool>>;
    fn read_holding_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>>;
    fn read_input_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>>;
    fn write_single_coil(&mut self, address: u16, value: bool) -> ModbusResult<()>;
    fn write_single_register(&mut self, address: u16, value: u16) -> ModbusResult<()>;
}

enum Link {
    Tcp(TcpTransport<TcpStream>),
    #[cfg(feature = "rtu")]
    Rtu(RtuTransport<tokio_serial::SerialStream>),
}

impl Link {
    async fn request(&mut self, pdu: &[u8]) -> ModbusResult<Vec<u8>> {
        match self {
            Link::Tcp(t) => t.request(pdu).await,
            #[cfg(feature = "rtu")]
            Link::Rtu(t) => t.request(pdu).await,
        }
    }

    async fn shutdown(&mut self) {
        match self {
            Link::Tcp(t) => t.shutdown().await,
            #[cfg(feature = "rtu")]
            Link::Rtu(t) => t.shutdown().await,
        }
    }

    fn is_desynced(&self) -> bool {
        match self {
            Link::Tcp(t) => t.is_desynced(),
            #[cfg(feature = "rtu")]
            Link::Rtu(t) => t.is_desynced(),
        }
    }
}

/// [`ModbusDriver`] backed by the TCP/RTU transports.
pub struct ClientDriver {
    config: ModbusConfig,
    runtime: Runtime,
    link: Option<Link>,
}

impl ClientDriver {
    pub fn new(config: ModbusConfig) -> ModbusResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            config,
            runtime,
            link: None,
        })
    }

    async fn open(config: &ModbusConfig) -> ModbusResult<Link> {
        match &config.connection {
            Connection::Tcp { ip_address, port } => {
                let stream = tokio::time::timeout(
                    config.timeout,
                    TcpStream::connect((ip_address.as_str(), *port)),
                )
                .await
                .map_err(|_| timeout_error(config.timeout))??;
                stream.set_nodelay(true)?;
                debug!(%ip_address, port, "TCP connection established");
                Ok(Link::Tcp(TcpTransport::new(
                    stream,
                    config.slave_id,
                    config.timeout,
                )))
            }
            #[cfg(feature = "rtu")]
            Connection::Rtu {
                device_path,
                baudrate,
                parity,
                data_bits,
                stop_bits,
            } => {
                use super::settings::Parity;
                use tokio_serial::SerialPortBuilderExt;

                let port = tokio_serial::new(device_path.as_str(), *baudrate)
                    .parity(match parity {
                        Parity::None => tokio_serial::Parity::None,
                        Parity::Even => tokio_serial::Parity::Even,
                        Parity::Odd => tokio_serial::Parity::Odd,
                    })
                    .data_bits(match *data_bits {
                        5 => tokio_serial::DataBits::Five,
                        6 => tokio_serial::DataBits::Six,
                        7 => tokio_serial::DataBits::Seven,
                        _ => tokio_serial::DataBits::Eight,
                    })
                    .stop_bits(if *stop_bits == 2 {
                        tokio_serial::StopBits::Two
                    } else {
                        tokio_serial::StopBits::One
                    })
                    .timeout(config.timeout)
                    .open_native_async()
                    .map_err(|e| ModbusError::connection(format!("{}: {}", device_path, e)))?;
                debug!(%device_path, baudrate, "serial port opened");
                Ok(Link::Rtu(RtuTransport::new(
                    port,
                    config.slave_id,
                    config.timeout,
                )))
            }
            #[cfg(not(feature = "rtu"))]
            Connection::Rtu { device_path, .. } => Err(ModbusError::connection(format!(
                "{}: RTU support not enabled in this build",
                device_path
            ))),
        }
    }

    /// Run one request, first replacing a link left out of sync by an
    /// earlier failure. If reopening fails the stale link is kept and the
    /// next request tries again.
    fn exchange(&mut self, pdu: &[u8]) -> ModbusResult<Vec<u8>> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| ModbusError::connection("not connected"))?;
        if link.is_desynced() {
            debug!("reopening modbus link");
            self.runtime.block_on(link.shutdown());
            *link = self.runtime.block_on(Self::open(&self.config))?;
        }
        self.runtime.block_on(link.request(pdu))
    }

    fn read_registers(&mut self, function: u8, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        let request = frame::build_read_pdu(function, address, count);
        let response = self.exchange(&request)?;
        frame::parse_register_response(&response, function)
    }

    fn read_bits(&mut self, function: u8, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let request = frame::build_read_pdu(function, address, count);
        let response = self.exchange(&request)?;
        frame::parse_bit_response(&response, function, count)
    }
}

impl ModbusDriver for ClientDriver {
    fn connect(&mut self) -> ModbusResult<()> {
        let link = self.runtime.block_on(Self::open(&self.config))?;
        self.link = Some(link);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            self.runtime.block_on(link.shutdown());
        }
    }

    fn read_coils(&mut self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.read_bits(FC_READ_COILS, address, count)
    }

    fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.read_bits(FC_READ_DISCRETE_INPUTS, address, count)
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        self.read_registers(FC_READ_HOLDING_REGISTERS, address, count)
    }

    fn read_input_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        self.read_registers(FC_READ_INPUT_REGISTERS, address, count)
    }

    fn write_single_coil(&mut self, address: u16, value: bool) -> ModbusResult<()> {
        let request = frame::build_write_single_coil_pdu(address, value);
        let response = self.exchange(&request)?;
        frame::check_write_echo(&response, &request)
    }

    fn write_single_register(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        let request = frame::build_write_single_register_pdu(address, value);
        let response = self.exchange(&request)?;
        frame::check_write_echo(&response, &request)
    }
}

impl Drop for ClientDriver {
    fn drop(&mut self) {
        if self.link.is_some() {
            warn!("modbus driver dropped while connected");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_tcp_request_response() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x64, 0x00, 0x01];
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A];
        let mock = Builder::new().write(&request).read(&response).build();

        let mut transport = TcpTransport::new(mock, 1, Duration::from_secs(1));
        let pdu = frame::build_read_pdu(FC_READ_HOLDING_REGISTERS, 100, 1);
        let body = transport.request(&pdu).await.unwrap();
        assert_eq!(body, vec![0x03, 0x02, 0x00, 0x2A]);
        assert_eq!(frame::parse_register_response(&body, 0x03).unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_tcp_skips_stale_transaction() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x01, 0x00, 0x03];
        let stale = [0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x04];
        let fresh = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x01, 0x00, 0x03];
        let mock = Builder::new().write(&request).read(&stale).read(&fresh).build();

        let mut transport = TcpTransport::new(mock, 1, Duration::from_secs(1));
        let pdu = frame::build_write_single_register_pdu(1, 3);
        let body = transport.request(&pdu).await.unwrap();
        assert!(frame::check_write_echo(&body, &pdu).is_ok());
    }

    #[tokio::test]
    async fn test_tcp_unit_mismatch() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x02, 0x03, 0x02, 0x00, 0x2A];
        let mock = Builder::new().write(&request).read(&response).build();

        let mut transport = TcpTransport::new(mock, 1, Duration::from_secs(1));
        let pdu = frame::build_read_pdu(FC_READ_HOLDING_REGISTERS, 0, 1);
        assert!(matches!(
            transport.request(&pdu).await,
            Err(ModbusError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_tcp_timeout() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let mock = Builder::new()
            .write(&request)
            .wait(Duration::from_millis(500))
            .build();

        let mut transport = TcpTransport::new(mock, 1, Duration::from_millis(50));
        let pdu = frame::build_read_pdu(FC_READ_HOLDING_REGISTERS, 0, 1);
        assert!(matches!(
            transport.request(&pdu).await,
            Err(ModbusError::Timeout { timeout_ms: 50 })
        ));
        assert!(transport.is_desynced());
    }

    #[tokio::test]
    async fn test_tcp_partial_response_refuses_further_requests() {
        let (client, mut server) = tokio::io::duplex(256);
        let peer = tokio::spawn(async move {
            let mut request = [0u8; 12];
            server.read_exact(&mut request).await.unwrap();
            let response = [request[0], request[1], 0, 0, 0, 5, 1, 0x03, 0x02, 0x00, 0x2A];
            server.write_all(&response[..3]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            server.write_all(&response[3..]).await.unwrap();
            server
        });

        let mut transport = TcpTransport::new(client, 1, Duration::from_millis(50));
        let pdu = frame::build_read_pdu(FC_READ_HOLDING_REGISTERS, 0, 1);
        assert!(matches!(
            transport.request(&pdu).await,
            Err(ModbusError::Timeout { timeout_ms: 50 })
        ));
        assert!(transport.is_desynced());

        // The tail of the first response is now buffered; it must not be
        // parsed as the next header.
        let _server = peer.await.unwrap();
        assert!(matches!(
            transport.request(&pdu).await,
            Err(ModbusError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_tcp_completed_exchange_stays_in_sync() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x01];
        let mock = Builder::new().write(&request).read(&response).build();

        let mut transport = TcpTransport::new(mock, 1, Duration::from_secs(1));
        let pdu = frame::build_read_pdu(FC_READ_HOLDING_REGISTERS, 0, 1);
        transport.request(&pdu).await.unwrap();
        assert!(!transport.is_desynced());
    }

    #[tokio::test]
    async fn test_rtu_request_response() {
        let request = frame::encode_rtu_frame(0x01, &frame::build_read_pdu(FC_READ_COILS, 0, 3));
        let response = frame::encode_rtu_frame(0x01, &[0x01, 0x01, 0x05]);
        let mock = Builder::new().write(&request).read(&response).build();

        let mut transport = RtuTransport::new(mock, 1, Duration::from_secs(1));
        let body = transport
            .request(&frame::build_read_pdu(FC_READ_COILS, 0, 3))
            .await
            .unwrap();
        assert_eq!(
            frame::parse_bit_response(&body, FC_READ_COILS, 3).unwrap(),
            vec![true, false, true]
        );
    }

    #[tokio::test]
    async fn test_rtu_exception() {
        let pdu = frame::build_read_pdu(FC_READ_HOLDING_REGISTERS, 0, 1);
        let request = frame::encode_rtu_frame(0x01, &pdu);
        let response = frame::encode_rtu_frame(0x01, &[0x83, 0x02]);
        let mock = Builder::new().write(&request).read(&response).build();

        let mut transport = RtuTransport::new(mock, 1, Duration::from_secs(1));
        let body = transport.request(&pdu).await.unwrap();
        assert!(matches!(
            frame::parse_register_response(&body, FC_READ_HOLDING_REGISTERS),
            Err(ModbusError::Exception { code: 0x02, .. })
        ));
    }

    #[test]
    fn test_client_driver_requires_connect() {
        let config = ModbusConfig {
            connection: Connection::Tcp {
                ip_address: "127.0.0.1".into(),
                port: 1,
            },
            slave_id: 1,
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_secs(1),
        };
        let mut driver = ClientDriver::new(config).unwrap();
        assert!(matches!(
            driver.read_holding_registers(0, 1),
            Err(ModbusError::Connection { .. })
        ));
    }

    #[test]
    fn test_client_driver_against_local_server() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).unwrap();
            let mut response = vec![request[0], request[1], 0, 0, 0, 7, request[6], 0x03, 0x04];
            response.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
            socket.write_all(&response).unwrap();
        });

        let config = ModbusConfig {
            connection: Connection::Tcp {
                ip_address: "127.0.0.1".into(),
                port,
            },
            slave_id: 1,
            timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
        };
        let mut driver = ClientDriver::new(config).unwrap();
        driver.connect().unwrap();
        assert_eq!(
            driver.read_holding_registers(0, 2).unwrap(),
            vec![0x1234, 0x5678]
        );
        driver.close();
        server.join().unwrap();
    }

    #[test]
    fn test_client_driver_reconnects_after_partial_response() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let mut request = [0u8; 12];

            // First connection: three bytes of the response, then silence.
            let (mut stalled, _) = listener.accept().unwrap();
            stalled.read_exact(&mut request).unwrap();
            stalled.write_all(&[request[0], request[1], 0]).unwrap();

            let (mut fresh, _) = listener.accept().unwrap();
            fresh.read_exact(&mut request).unwrap();
            let response = [request[0], request[1], 0, 0, 0, 5, request[6], 0x03, 0x02, 0x00, 0x2A];
            fresh.write_all(&response).unwrap();
            drop(stalled);
        });

        let config = ModbusConfig {
            connection: Connection::Tcp {
                ip_address: "127.0.0.1".into(),
                port,
            },
            slave_id: 1,
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_secs(1),
        };
        let mut driver = ClientDriver::new(config).unwrap();
        driver.connect().unwrap();
        assert!(matches!(
            driver.read_holding_registers(0, 1),
            Err(ModbusError::Timeout { timeout_ms: 100 })
        ));
        assert_eq!(driver.read_holding_registers(0, 1).unwrap(), vec![42]);
        driver.close();
        server.join().unwrap();
    }
}
