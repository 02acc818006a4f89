use std::hint::black_box;
use std::sync::Arc;

use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;
use http::{Method, Request, Response, StatusCode};
use plexer_http::codec::{RequestDecoder, ResponseEncoder};
use plexer_http::endpoint::{Endpoint, PathEndpoint, PathSet, endpoint_fn, get, post};
use plexer_http::protocol::response::response_for;
use plexer_net::{BoxError, Connection, NullHooks};
use tokio_util::codec::{Decoder, Encoder};

fn bench_request_decoder(c: &mut Criterion) {
    let request = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
    let request_with_body = b"POST /items HTTP/1.1\r\nHost: localhost\r\nContent-Length: 13\r\n\r\n{\"id\": 12345}";

    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(&request[..]);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });

    c.bench_function("decode_request_with_body", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(&request_with_body[..]);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });
}

fn bench_response_encoder(c: &mut Criterion) {
    let response = Response::builder().status(StatusCode::OK).body("Hello World!".to_string()).unwrap();

    c.bench_function("encode_simple_response", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = BytesMut::new();
            black_box(encoder.encode(response.clone(), &mut bytes).unwrap());
        });
    });
}

fn bench_routing(c: &mut Criterion) {
    let hello = || endpoint_fn(|_, request: Request<String>| async move { Ok::<_, BoxError>(response_for(&request, StatusCode::OK, "hello")) });

    let mut tree = PathSet::new();
    for index in 0..16 {
        tree.push(PathEndpoint::prefix(format!("/service-{index}"), get(hello())));
    }
    tree.push(PathEndpoint::exact("/items", post(hello())));
    let root: Arc<dyn Endpoint> = Arc::new(tree);
    let context = Connection::new(NullHooks).context().clone();

    c.bench_function("route_last_of_17", |b| {
        b.iter(|| {
            let request = Request::builder().method(Method::POST).uri("/items").body(String::new()).unwrap();
            black_box(block_on(root.handle(&context, request)).unwrap());
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_encoder, bench_routing);
criterion_main!(benches);
