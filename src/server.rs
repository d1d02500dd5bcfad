//! DNS listeners: parse inbound wire queries, serve them from the cache
//! or the dispatcher, and write wire replies back over UDP and TCP.

use crate::cache::{CacheKey, ReplyCache};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::record::row_to_record;
use crate::reply::NormalizedReply;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Largest reply we send over UDP without truncating. No EDNS is
/// negotiated on the listener side, so the classic limit applies.
const MAX_UDP_PAYLOAD: usize = 512;

/// Shared state for both listeners.
#[derive(Clone)]
pub struct ServerContext {
    pub cache: Arc<ReplyCache>,
    pub dispatcher: Dispatcher,
}

/// Bind the UDP listener and serve until shutdown.
pub async fn run_udp_server(
    bind: SocketAddr,
    ctx: ServerContext,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let socket = Arc::new(UdpSocket::bind(bind).await?);
    info!("UDP DNS listener on {bind}");
    serve_udp(socket, ctx, shutdown).await;
    Ok(())
}

/// Serve DNS over an already-bound UDP socket.
pub async fn serve_udp(
    socket: Arc<UdpSocket>,
    ctx: ServerContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("UDP listener shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                let (len, peer) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("UDP recv error: {e}");
                        continue;
                    }
                };
                let data = buf[..len].to_vec();
                let socket = socket.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_message(&ctx, &data, true).await {
                        if let Err(e) = socket.send_to(&response, peer).await {
                            warn!("failed to send UDP reply to {peer}: {e}");
                        }
                    }
                });
            }
        }
    }
}

/// Bind the TCP listener and serve until shutdown.
pub async fn run_tcp_server(
    bind: SocketAddr,
    ctx: ServerContext,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("TCP DNS listener on {bind}");
    serve_tcp(listener, ctx, shutdown).await;
    Ok(())
}

/// Serve DNS over an already-bound TCP listener.
pub async fn serve_tcp(
    listener: TcpListener,
    ctx: ServerContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("TCP listener shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("TCP accept error: {e}");
                        continue;
                    }
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_tcp_connection(stream, &ctx).await {
                        debug!("TCP connection from {peer} ended: {e}");
                    }
                });
            }
        }
    }
}

/// One TCP connection: a sequence of length-prefixed DNS messages.
async fn serve_tcp_connection(mut stream: TcpStream, ctx: &ServerContext) -> std::io::Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Ok(());
        }
        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).await?;

        if let Some(response) = handle_message(ctx, &data, false).await {
            if response.len() > usize::from(u16::MAX) {
                warn!("TCP reply exceeds frame limit, dropping");
                continue;
            }
            stream.write_all(&(response.len() as u16).to_be_bytes()).await?;
            stream.write_all(&response).await?;
        }
    }
}

/// Handle one inbound wire message and produce the wire reply, if any.
///
/// Unparseable messages and messages without questions are dropped
/// silently; only `question[0]` is resolved. A reply that fails to pack
/// is also dropped, leaving the client to its own retry policy.
pub async fn handle_message(ctx: &ServerContext, data: &[u8], udp: bool) -> Option<Vec<u8>> {
    let request = match Message::from_bytes(data) {
        Ok(message) => message,
        Err(e) => {
            trace!("dropping unparseable message: {e}");
            return None;
        }
    };
    let question = match request.queries().first() {
        Some(question) => question.clone(),
        None => {
            debug!("no questions");
            return None;
        }
    };

    let qname = canonical_qname(&question.name().to_lowercase().to_utf8());
    let qtype = u16::from(question.query_type());
    debug!("resolving {}/{}", qname, question.query_type());

    let reply = resolve_cached(ctx, &qname, qtype).await;
    let mut response = build_response(&request, &reply);
    if udp {
        response = truncate_for_udp(response);
    }

    match response.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("failed to pack reply for {qname}: {e}");
            None
        }
    }
}

/// Root-terminate a name so cache keys and upstream queries agree.
fn canonical_qname(name: &str) -> String {
    let mut qname = name.to_string();
    if !qname.ends_with('.') {
        qname.push('.');
    }
    qname
}

/// Cache-or-dispatch for one question. Every dispatcher outcome, failures
/// included, is inserted back into the cache.
async fn resolve_cached(ctx: &ServerContext, qname: &str, qtype: u16) -> NormalizedReply {
    let key = CacheKey::new(qname, qtype);
    if let Some(hit) = ctx.cache.get(&key) {
        trace!("cache hit for {key}");
        return hit;
    }
    let reply = ctx.dispatcher.resolve(qname.to_string(), qtype).await;
    ctx.cache.insert(key, reply.clone());
    reply
}

/// Assemble the outbound message: the request's ID and questions, the
/// normalized reply's RCODE, flags, and record sections. A failed
/// upstream exchange becomes SERVFAIL with empty sections. Rows the
/// translator rejects are dropped individually.
pub fn build_response(request: &Message, reply: &NormalizedReply) -> Message {
    let mut response = Message::new();
    response.set_id(request.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(request.op_code());
    response.set_recursion_desired(request.recursion_desired());
    for query in request.queries() {
        response.add_query(query.clone());
    }

    if reply.status >= 0 {
        response.set_response_code(ResponseCode::from(
            (reply.status >> 4) as u8,
            (reply.status & 0x0f) as u8,
        ));
        response.set_truncated(reply.tc);
        response.set_recursion_desired(reply.rd);
        response.set_recursion_available(reply.ra);
        response.set_authentic_data(reply.ad);
        response.set_checking_disabled(reply.cd);

        for row in &reply.answer {
            match row_to_record(row) {
                Ok(record) => {
                    response.add_answer(record);
                }
                Err(e) => debug!("dropping answer row: {e}"),
            }
        }
        for row in &reply.authority {
            match row_to_record(row) {
                Ok(record) => {
                    response.add_name_server(record);
                }
                Err(e) => debug!("dropping authority row: {e}"),
            }
        }
        for row in &reply.additional {
            match row_to_record(row) {
                Ok(record) => {
                    response.add_additional(record);
                }
                Err(e) => debug!("dropping additional row: {e}"),
            }
        }
    } else {
        response.set_response_code(ResponseCode::ServFail);
    }
    response
}

/// Clamp an oversized UDP reply to header plus question with TC set; the
/// client is expected to retry over TCP.
fn truncate_for_udp(response: Message) -> Message {
    let size = match response.to_bytes() {
        Ok(bytes) => bytes.len(),
        // let the caller surface the pack failure
        Err(_) => return response,
    };
    if size <= MAX_UDP_PAYLOAD {
        return response;
    }
    debug!("reply id {} is {size} bytes, truncating for UDP", response.id());

    let mut truncated = Message::new();
    truncated.set_id(response.id());
    truncated.set_message_type(MessageType::Response);
    truncated.set_op_code(response.op_code());
    truncated.set_response_code(response.response_code());
    truncated.set_recursion_desired(response.recursion_desired());
    truncated.set_recursion_available(response.recursion_available());
    truncated.set_truncated(true);
    for query in response.queries() {
        truncated.add_query(query.clone());
    }
    truncated
}
