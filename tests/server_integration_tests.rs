//! End-to-end tests driving the real UDP and TCP listeners with synthetic
//! resolver workers on the dispatch queue.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use ratatosk::cache::ReplyCache;
use ratatosk::config::CacheOptions;
use ratatosk::dispatch::{Dispatcher, next_query};
use ratatosk::reply::{NormalizedReply, Rr};
use ratatosk::server::{ServerContext, serve_tcp, serve_udp};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn ok_reply() -> NormalizedReply {
    let mut reply = NormalizedReply::failure();
    reply.status = 0;
    reply.rd = true;
    reply.ra = true;
    reply.answer = vec![Rr::new("example.com.", 1, 3600, "93.184.216.34")];
    reply
}

/// Spawn a synthetic worker answering every query with `reply`, counting
/// how many queries reached it.
fn spawn_worker(
    dispatcher: &Dispatcher,
    reply: NormalizedReply,
    upstream_hits: Arc<AtomicUsize>,
) {
    let queue = dispatcher.receiver();
    tokio::spawn(async move {
        while let Some(query) = next_query(&queue).await {
            upstream_hits.fetch_add(1, Ordering::SeqCst);
            let _ = query.reply_sink.send(reply.clone());
        }
    });
}

fn test_context() -> (ServerContext, broadcast::Sender<()>) {
    let cache = Arc::new(ReplyCache::new(&CacheOptions::default()));
    let dispatcher = Dispatcher::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    (ServerContext { cache, dispatcher }, shutdown_tx)
}

async fn start_udp(ctx: ServerContext, shutdown: &broadcast::Sender<()>) -> SocketAddr {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(serve_udp(socket, ctx, rx));
    addr
}

fn query_bytes(id: u16, qname: &str, qtype: RecordType) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(id);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(qname).unwrap(), qtype));
    message.to_bytes().unwrap()
}

async fn udp_exchange(server: SocketAddr, request: &[u8]) -> Vec<u8> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(request, server).await.unwrap();
    let mut buf = vec![0u8; 4096];
    let (len, _) = timeout(WAIT, client.recv_from(&mut buf)).await.unwrap().unwrap();
    buf.truncate(len);
    buf
}

#[tokio::test]
async fn udp_query_resolves_to_noerror_answer() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, ok_reply(), hits.clone());
    let server = start_udp(ctx, &shutdown).await;

    let response = udp_exchange(server, &query_bytes(0x1234, "example.com.", RecordType::A)).await;
    let message = Message::from_bytes(&response).unwrap();

    assert_eq!(message.id(), 0x1234);
    assert_eq!(message.response_code(), ResponseCode::NoError);
    assert_eq!(message.queries().len(), 1);
    assert_eq!(message.answers().len(), 1);
    match message.answers()[0].data() {
        RData::A(addr) => assert_eq!(addr.0.to_string(), "93.184.216.34"),
        other => panic!("unexpected rdata: {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_upstream_yields_servfail() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, NormalizedReply::failure(), hits.clone());
    let server = start_udp(ctx, &shutdown).await;

    let response = udp_exchange(server, &query_bytes(0x4242, "down.example.", RecordType::A)).await;
    let message = Message::from_bytes(&response).unwrap();

    assert_eq!(message.id(), 0x4242);
    assert_eq!(message.response_code(), ResponseCode::ServFail);
    assert!(message.answers().is_empty());
    assert_eq!(message.queries()[0].name().to_utf8(), "down.example.");
}

#[tokio::test]
async fn second_query_is_served_from_cache_byte_identical() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, ok_reply(), hits.clone());
    let server = start_udp(ctx, &shutdown).await;

    let mut first = udp_exchange(server, &query_bytes(1, "example.com.", RecordType::A)).await;
    let mut second = udp_exchange(server, &query_bytes(2, "example.com.", RecordType::A)).await;

    // exactly one upstream exchange for the pair
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // identical payloads apart from the message ID
    first[0] = 0;
    first[1] = 0;
    second[0] = 0;
    second[1] = 0;
    assert_eq!(first, second);
}

#[tokio::test]
async fn mixed_case_queries_share_one_cache_entry() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, ok_reply(), hits.clone());
    let server = start_udp(ctx, &shutdown).await;

    udp_exchange(server, &query_bytes(1, "Example.COM.", RecordType::A)).await;
    udp_exchange(server, &query_bytes(2, "example.com.", RecordType::A)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_replies_are_negatively_cached() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, NormalizedReply::failure(), hits.clone());
    let server = start_udp(ctx, &shutdown).await;

    for id in 0..3u16 {
        let response =
            udp_exchange(server, &query_bytes(id, "down.example.", RecordType::A)).await;
        let message = Message::from_bytes(&response).unwrap();
        assert_eq!(message.response_code(), ResponseCode::ServFail);
    }
    // the first failure is cached; the broken upstream is asked once
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn queries_without_questions_are_dropped() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, ok_reply(), hits.clone());
    let server = start_udp(ctx, &shutdown).await;

    let mut empty = Message::new();
    empty.set_id(77);
    empty.set_message_type(MessageType::Query);
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&empty.to_bytes().unwrap(), server).await.unwrap();

    let mut buf = [0u8; 512];
    assert!(timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tcp_query_round_trips_with_length_prefix() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    spawn_worker(&ctx.dispatcher, ok_reply(), hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(serve_tcp(listener, ctx, rx));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = query_bytes(0x0909, "example.com.", RecordType::A);
    stream.write_all(&(request.len() as u16).to_be_bytes()).await.unwrap();
    stream.write_all(&request).await.unwrap();

    let mut len_buf = [0u8; 2];
    timeout(WAIT, stream.read_exact(&mut len_buf)).await.unwrap().unwrap();
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut response = vec![0u8; len];
    timeout(WAIT, stream.read_exact(&mut response)).await.unwrap().unwrap();

    let message = Message::from_bytes(&response).unwrap();
    assert_eq!(message.id(), 0x0909);
    assert_eq!(message.response_code(), ResponseCode::NoError);
    assert_eq!(message.answers().len(), 1);
}

#[tokio::test]
async fn workers_from_multiple_pools_share_the_queue() {
    let (ctx, shutdown) = test_context();
    let hits = Arc::new(AtomicUsize::new(0));
    // two "providers" with different pool sizes, all on one queue
    for _ in 0..3 {
        spawn_worker(&ctx.dispatcher, ok_reply(), hits.clone());
    }
    let server = start_udp(ctx, &shutdown).await;

    let mut handles = Vec::new();
    for i in 0..12u16 {
        let qname = format!("h{i}.example.com.");
        handles.push(tokio::spawn(async move {
            let response = udp_exchange(server, &query_bytes(i, &qname, RecordType::A)).await;
            Message::from_bytes(&response).unwrap().response_code()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), ResponseCode::NoError);
    }
    // distinct names: every query goes upstream exactly once
    assert_eq!(hits.load(Ordering::SeqCst), 12);
}
