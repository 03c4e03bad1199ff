use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::{BUFFER_SIZE, ROLE_RECEIVER, ROLE_SENDER, ROOM_ID_LEN};

type RoomId = [u8; ROOM_ID_LEN];

/// A first arrival parked in the room table. The oneshot sender is the
/// rendezvous: the second peer pushes its socket through it and the waiter
/// does the piping. The id disambiguates the timeout/pairing race so a
/// timed-out waiter never evicts a successor slot.
struct RoomSlot {
    waiting_role: u8,
    id: u64,
    handoff: oneshot::Sender<TcpStream>,
}

/// Dumb TCP switchboard. Reads a 5-byte header (4-byte room id + 1 role
/// byte), pairs opposite roles sharing a room, then copies bytes both ways
/// without ever looking at them.
pub struct RelayServer {
    timeout: Duration,
    next_slot_id: AtomicU64,
    rooms: Mutex<HashMap<RoomId, RoomSlot>>,
}

impl RelayServer {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(RelayServer {
            timeout,
            next_slot_id: AtomicU64::new(0),
            rooms: Mutex::new(HashMap::new()),
        })
    }

    /// Accept loop. Accept errors are logged and the loop keeps going.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((conn, addr)) => {
                    debug!("relay: connection from {addr}");
                    tokio::spawn(Arc::clone(&self).handle(conn));
                }
                Err(e) => {
                    warn!("relay: accept error: {e}");
                }
            }
        }
    }

    /// Drive one connection from header to teardown.
    pub async fn handle(self: Arc<Self>, mut conn: TcpStream) {
        conn.set_nodelay(true).ok();

        let mut room = [0u8; ROOM_ID_LEN];
        let mut role = [0u8; 1];
        if conn.read_exact(&mut room).await.is_err() || conn.read_exact(&mut role).await.is_err() {
            debug!("relay: connection dropped before header");
            return;
        }
        let role = role[0];
        if role != ROLE_SENDER && role != ROLE_RECEIVER {
            warn!("relay: unknown role byte {role}, dropping");
            return;
        }

        let (slot_id, rx) = {
            let mut rooms = self.rooms.lock().unwrap();
            match rooms.entry(room) {
                Entry::Occupied(entry) => {
                    if entry.get().waiting_role == role {
                        // Opposite roles only: pairing two of a kind would
                        // hand PAKE two same-side parties. The waiting slot
                        // stays untouched.
                        warn!("relay: duplicate role {role} for room {room:02x?}, dropping");
                        return;
                    }
                    let slot = entry.remove();
                    drop(rooms);
                    info!("relay: paired room {room:02x?}");
                    // The waiter pipes; our task is done once the socket is
                    // handed over. If the waiter timed out in the meantime
                    // the send fails and the socket just closes.
                    if slot.handoff.send(conn).is_err() {
                        debug!("relay: waiter left before handoff, dropping peer");
                    }
                    return;
                }
                Entry::Vacant(entry) => {
                    let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = oneshot::channel();
                    entry.insert(RoomSlot {
                        waiting_role: role,
                        id,
                        handoff: tx,
                    });
                    (id, rx)
                }
            }
        };

        debug!(
            "relay: role {role} waiting in room {room:02x?} (timeout {:?})",
            self.timeout
        );
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(peer)) => splice(conn, peer).await,
            Ok(Err(_)) => {
                // Sender side dropped without sending; nothing to clean up
                // because only removal paths drop the slot.
                debug!("relay: rendezvous channel closed for room {room:02x?}");
            }
            Err(_) => {
                let mut rooms = self.rooms.lock().unwrap();
                if rooms.get(&room).map(|s| s.id) == Some(slot_id) {
                    rooms.remove(&room);
                }
                info!("relay: pairing timeout for room {room:02x?}");
            }
        }
    }

    /// Number of rooms with a peer still waiting. Test hook.
    pub fn waiting_rooms(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }
}

/// Copy bytes both ways until each direction has seen EOF, propagating
/// half-closes so the applications observe clean end-of-stream. Both
/// sockets are closed once both directions finish.
async fn splice(a: TcpStream, b: TcpStream) {
    let (a_read, a_write) = a.into_split();
    let (b_read, b_write) = b.into_split();
    let forward = tokio::spawn(copy_direction(a_read, b_write));
    let backward = tokio::spawn(copy_direction(b_read, a_write));
    let _ = forward.await;
    let _ = backward.await;
    debug!("relay: splice finished");
}

async fn copy_direction(mut from: OwnedReadHalf, mut to: OwnedWriteHalf) {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        match from.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if to.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    // FIN to the far side; its pending read completes with EOF.
    let _ = to.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::time::Instant;

    async fn spawn_relay(timeout: Duration) -> (Arc<RelayServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(timeout);
        tokio::spawn(Arc::clone(&server).serve(listener));
        (server, addr)
    }

    async fn join(addr: SocketAddr, room: &[u8; ROOM_ID_LEN], role: u8) -> TcpStream {
        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(room).await.unwrap();
        conn.write_all(&[role]).await.unwrap();
        conn
    }

    #[tokio::test]
    async fn pairs_opposite_roles_and_pipes() {
        let (_server, addr) = spawn_relay(Duration::from_secs(5)).await;

        let mut sender = join(addr, b"r001", ROLE_SENDER).await;
        let mut receiver = join(addr, b"r001", ROLE_RECEIVER).await;

        sender.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        receiver.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        receiver.write_all(b"pong").await.unwrap();
        sender.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn distinct_rooms_do_not_pair() {
        let (server, addr) = spawn_relay(Duration::from_secs(5)).await;

        let _a = join(addr, b"aaaa", ROLE_SENDER).await;
        let _b = join(addr, b"bbbb", ROLE_RECEIVER).await;

        // Give both connections time to land in the table.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.waiting_rooms(), 2);
    }

    #[tokio::test]
    async fn same_role_second_arrival_is_dropped() {
        let (server, addr) = spawn_relay(Duration::from_secs(5)).await;

        let _first = join(addr, b"dup1", ROLE_SENDER).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut second = join(addr, b"dup1", ROLE_SENDER).await;

        // The duplicate gets closed without pairing; the first keeps waiting.
        let mut buf = [0u8; 1];
        let n = second.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(server.waiting_rooms(), 1);
    }

    #[tokio::test]
    async fn unknown_role_is_dropped() {
        let (server, addr) = spawn_relay(Duration::from_secs(5)).await;

        let mut conn = join(addr, b"bad0", 7).await;
        let mut buf = [0u8; 1];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(server.waiting_rooms(), 0);
    }

    #[tokio::test]
    async fn pairing_timeout_clears_the_room() {
        let (server, addr) = spawn_relay(Duration::from_millis(500)).await;

        let start = Instant::now();
        let mut lonely = join(addr, b"z999", ROLE_SENDER).await;
        let mut buf = [0u8; 1];
        let n = lonely.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "relay should close the lonely peer");
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(server.waiting_rooms(), 0);
    }

    #[tokio::test]
    async fn half_close_propagates() {
        let (_server, addr) = spawn_relay(Duration::from_secs(5)).await;

        let mut sender = join(addr, b"fin1", ROLE_SENDER).await;
        let mut receiver = join(addr, b"fin1", ROLE_RECEIVER).await;

        sender.write_all(b"last words").await.unwrap();
        sender.shutdown().await.unwrap();

        let mut out = Vec::new();
        receiver.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"last words");

        // The reverse direction still works after the forward FIN.
        receiver.write_all(b"ack").await.unwrap();
        let mut buf = [0u8; 3];
        sender.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ack");
    }
}
