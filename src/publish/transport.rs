//! transport.rs
//! Live visualization server.
//!
//! TCP listener (socket2, SO_REUSEADDR) with a background accept thread. Each
//! connected client gets a writer thread fed by a small bounded queue, so one slow
//! client never holds up a channel publisher or the other clients.
//!
//! Wire format, both directions: [u32 big-endian length][protobuf `ServerFrame`].
//! - on connect a client receives one `ChannelAdvertisement` per registered channel
//! - every published message becomes a `MessageData` frame on all clients

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use prost::Message;
use socket2::{Domain, SockAddr, Socket, Type};
use thiserror::Error;

use crate::publish::{
    queue::OutboundMessage,
    sink::{Sink, SinkError},
};
use crate::schema::{ChannelAdvertisement, MessageData, ServerFrame, server_frame};

pub const MESSAGE_ENCODING: &str = "protobuf";

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const CLIENT_QUEUE_FRAMES: usize = 256;
/// Largest frame body either side accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid frame: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Length-prefix an encoded `ServerFrame`. Frames over `MAX_FRAME_LEN` are refused
/// by `read_frame`; callers check `encoded_len` first.
pub fn encode_frame(frame: &ServerFrame) -> Vec<u8> {
    let body_len = frame.encoded_len();
    let mut buf = Vec::with_capacity(4 + body_len);
    // Saturate rather than wrap, so an oversized length still reads as oversized.
    let prefix = u32::try_from(body_len).unwrap_or(u32::MAX);
    buf.extend_from_slice(&prefix.to_be_bytes());
    // Vec<u8> grows on demand, encoding into it cannot run out of space.
    let _ = frame.encode(&mut buf);
    buf
}

/// Blocking read of one length-prefixed frame.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<ServerFrame, TransportError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(ServerFrame::decode(body.as_slice())?)
}

fn advertise_frame(ad: &ChannelAdvertisement) -> Arc<Vec<u8>> {
    Arc::new(encode_frame(&ServerFrame {
        kind: Some(server_frame::Kind::Advertise(ad.clone())),
    }))
}

struct Client {
    addr: SocketAddr,
    stream: TcpStream,
    tx: Option<Sender<Arc<Vec<u8>>>>,
    writer: Option<JoinHandle<()>>,
}

impl Client {
    fn spawn(stream: TcpStream, addr: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))?;

        let (tx, rx) = bounded(CLIENT_QUEUE_FRAMES);
        let write_half = stream.try_clone()?;
        let writer = thread::Builder::new()
            .name(format!("viz-client-{}", addr))
            .spawn(move || client_writer(write_half, rx, addr))?;

        Ok(Self {
            addr,
            stream,
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    fn send(&self, frame: Arc<Vec<u8>>) -> Result<(), TrySendError<Arc<Vec<u8>>>> {
        match &self.tx {
            Some(tx) => tx.try_send(frame),
            None => Err(TrySendError::Disconnected(frame)),
        }
    }
}

impl Drop for Client {
    // Dropping the sender ends the writer's recv loop; shutdown unblocks a stuck write.
    fn drop(&mut self) {
        self.tx.take();
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

fn client_writer(mut stream: TcpStream, rx: Receiver<Arc<Vec<u8>>>, addr: SocketAddr) {
    while let Ok(frame) = rx.recv() {
        if let Err(e) = stream.write_all(&frame) {
            debug!("[Visualization] client {} write failed: {}", addr, e);
            break;
        }
    }
    debug!("[Visualization] client {} writer exiting", addr);
}

struct ServerShared {
    running: AtomicBool,
    // Lock order: channels before clients.
    channels: RwLock<Vec<ChannelAdvertisement>>,
    clients: Mutex<Vec<Client>>,
    next_channel_id: AtomicU32,
    skipped_frames: AtomicU64,
}

impl ServerShared {
    /// Queue a frame on every client. Full queues skip the frame; dead clients are dropped.
    fn broadcast(&self, frame: Arc<Vec<u8>>) {
        let mut clients = self.clients.lock();
        clients.retain(|client| match client.send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.skipped_frames.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                info!("[Visualization] client {} disconnected", client.addr);
                false
            }
        });
    }

    fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        let client = match Client::spawn(stream, addr) {
            Ok(c) => c,
            Err(e) => {
                warn!("[Visualization] could not set up client {}: {}", addr, e);
                return;
            }
        };

        let channels = self.channels.read();
        for ad in channels.iter() {
            // Fresh queue: only fails if it holds more channels than slots.
            if client.send(advertise_frame(ad)).is_err() {
                warn!("[Visualization] client {} missed advertisement of {}", addr, ad.topic);
            }
        }
        self.clients.lock().push(client);
        info!("[Visualization] client {} connected ({} channels advertised)", addr, channels.len());
    }
}

pub struct VisualizationServer {
    name: String,
    local_addr: SocketAddr,
    shared: Arc<ServerShared>,
    accept_thread: Option<JoinHandle<()>>,
}

impl VisualizationServer {
    /// Bind `addr` and start accepting clients in the background.
    /// Port 0 picks a free port; see `local_addr`.
    pub fn start(name: &str, addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(128)?;

        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(ServerShared {
            running: AtomicBool::new(true),
            channels: RwLock::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
            next_channel_id: AtomicU32::new(1),
            skipped_frames: AtomicU64::new(0),
        });

        let accept_shared = shared.clone();
        let accept_thread = thread::Builder::new()
            .name("viz-accept".into())
            .spawn(move || accept_loop(listener, accept_shared))?;

        info!("[Visualization] '{}' listening on {}", name, local_addr);
        Ok(Self {
            name: name.to_string(),
            local_addr,
            shared,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.lock().len()
    }

    /// Frames skipped because a client's queue was full.
    pub fn skipped_frames(&self) -> u64 {
        self.shared.skipped_frames.load(Ordering::Relaxed)
    }

    /// Register a channel and advertise it to every connected client.
    pub fn add_channel(&self, topic: &str, schema_name: &str) -> VisualizationChannel {
        let id = self.shared.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let ad = ChannelAdvertisement {
            channel_id: id,
            topic: topic.to_string(),
            encoding: MESSAGE_ENCODING.to_string(),
            schema_name: schema_name.to_string(),
        };

        let mut channels = self.shared.channels.write();
        self.shared.broadcast(advertise_frame(&ad));
        channels.push(ad);
        debug!("[Visualization] channel {} -> {} ({})", id, topic, schema_name);

        VisualizationChannel {
            id,
            topic: topic.to_string(),
            shared: self.shared.clone(),
        }
    }

    /// Stop accepting, disconnect every client. Safe to call more than once.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("[Visualization] accept thread panicked");
            }
        }

        let clients = std::mem::take(&mut *self.shared.clients.lock());
        let closed = clients.len();
        drop(clients);
        info!(
            "[Visualization] '{}' stopped ({} clients closed, {} frames skipped)",
            self.name,
            closed,
            self.skipped_frames()
        );
    }
}

impl Drop for VisualizationServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<ServerShared>) {
    while shared.running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, addr)) => shared.admit(stream, addr),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!("[Visualization] accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("[Visualization] accept loop exiting");
}

/// Publishing handle for one advertised channel.
pub struct VisualizationChannel {
    id: u32,
    topic: String,
    shared: Arc<ServerShared>,
}

impl VisualizationChannel {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Sink for VisualizationChannel {
    fn describe(&self) -> String {
        format!("viz:{}#{}", self.topic, self.id)
    }

    fn publish(&mut self, msg: &OutboundMessage) -> Result<(), SinkError> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let frame = ServerFrame {
            kind: Some(server_frame::Kind::Data(MessageData {
                channel_id: self.id,
                log_time_ns: msg.log_time_ns,
                payload: msg.payload.clone(),
            })),
        };
        // Clients reject anything larger, so it is never put on the wire.
        let len = frame.encoded_len();
        if len > MAX_FRAME_LEN {
            return Err(SinkError::Transport(TransportError::FrameTooLarge(len).to_string()));
        }
        self.shared.broadcast(Arc::new(encode_frame(&frame)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn local_server() -> VisualizationServer {
        VisualizationServer::start("test", "127.0.0.1:0".parse().unwrap()).unwrap()
    }

    fn wait_for_clients(server: &VisualizationServer, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while server.client_count() < n {
            assert!(Instant::now() < deadline, "client never registered");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn connect(server: &VisualizationServer) -> TcpStream {
        let stream = TcpStream::connect(server.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        stream
    }

    #[test]
    fn frame_length_prefix_is_big_endian() {
        let frame = ServerFrame {
            kind: Some(server_frame::Kind::Data(MessageData {
                channel_id: 3,
                log_time_ns: 9,
                payload: vec![1, 2, 3],
            })),
        };
        let bytes = encode_frame(&frame);
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - 4);
        assert_eq!(read_frame(&mut bytes.as_slice()).unwrap(), frame);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let bytes = u32::MAX.to_be_bytes();
        assert!(matches!(
            read_frame(&mut bytes.as_slice()),
            Err(TransportError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn client_gets_advertisements_then_data() {
        let mut server = local_server();
        let mut channel = server.add_channel("/TOM/location", "groundstation.Location");

        let mut client = connect(&server);
        wait_for_clients(&server, 1);

        match read_frame(&mut client).unwrap().kind {
            Some(server_frame::Kind::Advertise(ad)) => {
                assert_eq!(ad.topic, "/TOM/location");
                assert_eq!(ad.encoding, MESSAGE_ENCODING);
                assert_eq!(ad.channel_id, channel.id());
            }
            other => panic!("expected advertisement, got {:?}", other),
        }

        // Channels registered after connect are advertised too.
        let late = server.add_channel("/TOM/signal", "groundstation.SignalQuality");
        match read_frame(&mut client).unwrap().kind {
            Some(server_frame::Kind::Advertise(ad)) => assert_eq!(ad.channel_id, late.id()),
            other => panic!("expected advertisement, got {:?}", other),
        }

        channel.publish(&OutboundMessage::new(77, vec![5, 6])).unwrap();
        match read_frame(&mut client).unwrap().kind {
            Some(server_frame::Kind::Data(data)) => {
                assert_eq!(data.channel_id, channel.id());
                assert_eq!(data.log_time_ns, 77);
                assert_eq!(data.payload, vec![5, 6]);
            }
            other => panic!("expected data, got {:?}", other),
        }

        server.stop();
    }

    #[test]
    fn publishing_without_clients_is_not_an_error() {
        let server = local_server();
        let mut channel = server.add_channel("/TOM/telemetry", "groundstation.GroundPacket");
        assert!(channel.publish(&OutboundMessage::new(1, vec![1])).is_ok());
    }

    #[test]
    fn frame_over_the_limit_is_not_broadcast() {
        let mut server = local_server();
        let mut channel = server.add_channel("/camera/image_compressed", "foxglove.CompressedImage");
        let mut client = connect(&server);
        wait_for_clients(&server, 1);
        assert!(matches!(
            read_frame(&mut client).unwrap().kind,
            Some(server_frame::Kind::Advertise(_))
        ));

        let huge = OutboundMessage::new(1, vec![0u8; MAX_FRAME_LEN]);
        assert!(matches!(channel.publish(&huge), Err(SinkError::Transport(_))));

        // The next frame the client sees is the small one, not the rejected one.
        channel.publish(&OutboundMessage::new(2, vec![9])).unwrap();
        match read_frame(&mut client).unwrap().kind {
            Some(server_frame::Kind::Data(data)) => assert_eq!(data.log_time_ns, 2),
            other => panic!("expected data, got {:?}", other),
        }
        server.stop();
    }

    #[test]
    fn stop_is_idempotent_and_closes_channels() {
        let mut server = local_server();
        let mut channel = server.add_channel("/x", "s");
        server.stop();
        server.stop();
        assert!(matches!(
            channel.publish(&OutboundMessage::new(1, vec![])),
            Err(SinkError::Closed)
        ));
    }
}
