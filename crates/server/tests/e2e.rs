use std::process;

use http::{Request, StatusCode};
use plexer::{Server, ServerHandle};
use plexer_http::endpoint::{PathEndpoint, PathSet, endpoint_fn, get};
use plexer_http::protocol::response::response_for;
use plexer_net::{BoxError, EndpointAddress, Stream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn loopback() -> EndpointAddress {
    EndpointAddress::tcp(([127, 0, 0, 1], 0))
}

fn hello_tree() -> PathSet {
    PathSet::new().route(PathEndpoint::exact(
        "/hello",
        get(endpoint_fn(|_, request: Request<String>| async move {
            Ok::<_, BoxError>(response_for(&request, StatusCode::OK, "hello"))
        })),
    ))
}

async fn connect(address: &EndpointAddress) -> Stream {
    Stream::connect(address).await.unwrap()
}

/// Reads one complete response, leaving the stream open.
async fn read_response(stream: &mut Stream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        if let Some(head_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..head_end]).to_ascii_lowercase();
            let body_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map_or(0, |value| value.trim().parse::<usize>().unwrap());
            if buffer.len() >= head_end + 4 + body_length {
                return String::from_utf8(buffer).unwrap();
            }
        }

        let read = stream.read(&mut chunk).await.unwrap();
        assert_ne!(read, 0, "connection closed mid-response");
        buffer.extend_from_slice(&chunk[..read]);
    }
}

async fn request(stream: &mut Stream, head: &str) -> String {
    stream.write_all(head.as_bytes()).await.unwrap();
    read_response(stream).await
}

/// Whether the server has closed or reset `stream`.
async fn is_closed(stream: &mut Stream) -> bool {
    let mut chunk = [0_u8; 64];
    matches!(stream.read(&mut chunk).await, Ok(0) | Err(_))
}

async fn served(server: Server, handle: &ServerHandle, client: impl Future<Output = ()>) {
    let client = async {
        client.await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(server.run(), client);
    result.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn abstract_socket_without_root_endpoint() {
    let address = EndpointAddress::local(format!("plexer-e2e-{}-no-root", process::id()), true);
    let server = Server::builder().address(address.clone()).build().unwrap();
    let handle = server.handle();

    served(server, &handle, async {
        let mut client = connect(&address).await;
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        let response = response.to_ascii_lowercase();
        assert!(response.starts_with("http/1.1 500 internal server error\r\n"), "{response}");
        assert!(response.contains("comments: no-root-endpoint-installed\r\n"));
        assert!(response.contains("connection: close\r\n"));
        assert!(response.contains("content-length: 0\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    })
    .await;
}

#[tokio::test]
async fn full_pool_closes_new_streams() {
    let server = Server::builder().address(loopback()).max_connections(1).root_endpoint(hello_tree()).build().unwrap();
    let address = server.local_endpoint().unwrap();
    let handle = server.handle();

    served(server, &handle, async {
        let mut first = connect(&address).await;
        assert!(request(&mut first, "GET /hello HTTP/1.1\r\n\r\n").await.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(handle.active_connection_count(), 1);

        let mut second = connect(&address).await;
        let mut rest = Vec::new();
        assert_eq!(second.read_to_end(&mut rest).await.unwrap(), 0);
        assert_eq!(handle.active_connection_count(), 1);

        assert!(request(&mut first, "GET /hello HTTP/1.1\r\n\r\n").await.ends_with("\r\n\r\nhello"));
    })
    .await;
}

#[tokio::test]
async fn keep_alive_routing_over_tcp() {
    let server = Server::builder().address(loopback()).root_endpoint(hello_tree()).build().unwrap();
    let address = server.local_endpoint().unwrap();
    let handle = server.handle();

    served(server, &handle, async {
        let mut client = connect(&address).await;

        let ok = request(&mut client, "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(ok.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(ok.to_ascii_lowercase().contains("connection: keep-alive\r\n"));

        let missing = request(&mut client, "GET /missing HTTP/1.1\r\n\r\n").await;
        assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"));

        let wrong_verb = request(&mut client, "POST /hello HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi").await;
        assert!(wrong_verb.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        let last = request(&mut client, "GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(last.to_ascii_lowercase().contains("connection: close\r\n"));
        assert!(is_closed(&mut client).await);
    })
    .await;
}

#[tokio::test]
async fn shrinking_the_limit_evicts_connections() {
    let server = Server::builder().address(loopback()).max_connections(2).root_endpoint(hello_tree()).build().unwrap();
    let address = server.local_endpoint().unwrap();
    let handle = server.handle();

    served(server, &handle, async {
        let mut first = connect(&address).await;
        let mut second = connect(&address).await;
        request(&mut first, "GET /hello HTTP/1.1\r\n\r\n").await;
        request(&mut second, "GET /hello HTTP/1.1\r\n\r\n").await;
        assert_eq!(handle.active_connection_count(), 2);

        assert_eq!(handle.set_maximum_connections(1), 1);
        assert_eq!(handle.maximum_connection_count(), 1);
        assert_eq!(handle.active_connection_count(), 1);

        assert!(is_closed(&mut second).await);
        assert!(request(&mut first, "GET /hello HTTP/1.1\r\n\r\n").await.starts_with("HTTP/1.1 200 OK\r\n"));
    })
    .await;
}

#[tokio::test]
async fn shutdown_force_closes_connections() {
    let server = Server::builder().address(loopback()).root_endpoint(hello_tree()).build().unwrap();
    let address = server.local_endpoint().unwrap();
    let handle = server.handle();

    let mut client = connect(&address).await;
    let session = async {
        request(&mut client, "GET /hello HTTP/1.1\r\n\r\n").await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(server.run(), session);
    result.unwrap();

    assert_eq!(handle.active_connection_count(), 0);
    assert!(is_closed(&mut client).await);
}

#[cfg(unix)]
#[tokio::test]
async fn filesystem_socket_is_removed_on_shutdown() {
    let path = std::env::temp_dir().join(format!("plexer-e2e-{}.sock", process::id()));
    let address = EndpointAddress::local(path.as_os_str(), false);
    let server = Server::builder().address(address.clone()).root_endpoint(hello_tree()).build().unwrap();
    let handle = server.handle();
    assert!(path.exists());

    served(server, &handle, async {
        let mut client = connect(&address).await;
        let response = request(&mut client, "GET /hello HTTP/1.0\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(is_closed(&mut client).await);
    })
    .await;

    assert!(!path.exists());
}
