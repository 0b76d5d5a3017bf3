#![allow(dead_code)]

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// A parsed HTTP/1.1 response
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// Write `req` verbatim and read until the server closes the connection
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        send_bytes(addr, req.as_bytes())
    }

    pub fn send_bytes(addr: &SocketAddr, req: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn parse_response(resp: &str) -> RawResponse {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        RawResponse {
            status,
            headers,
            body: body.to_string(),
        }
    }

    /// `GET path` with `Connection: close`, parsed
    pub fn get(addr: &SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> RawResponse {
        let mut req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
        for (k, v) in extra_headers {
            req.push_str(&format!("{k}: {v}\r\n"));
        }
        req.push_str("\r\n");
        parse_response(&send_request(addr, &req))
    }

    pub fn post(addr: &SocketAddr, path: &str, content_type: &str, body: &[u8]) -> RawResponse {
        let mut req = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        req.extend_from_slice(body);
        parse_response(&send_bytes(addr, &req))
    }
}

pub mod dispatch {
    use http::Method;
    use strata::{FilterLayerHandler, Request, Response, RouterError};

    /// Run one request through `handler` and return both halves
    pub fn run(
        handler: &FilterLayerHandler,
        method: Method,
        path: &str,
    ) -> (Request, Response, Result<(), RouterError>) {
        let mut req = Request::new(method, path);
        let mut res = Response::new();
        let result = handler.handle(&mut req, &mut res);
        (req, res, result)
    }

    pub fn body(res: &Response) -> String {
        String::from_utf8_lossy(res.body()).to_string()
    }
}

pub mod test_server {
    use std::net::SocketAddr;
    use strata::{App, ServerHandle};

    /// Running server stopped on drop
    pub struct TestServer {
        handle: Option<ServerHandle>,
        pub addr: SocketAddr,
    }

    impl TestServer {
        pub fn start(app: App) -> Self {
            let handle = app.listen_on("127.0.0.1:0").unwrap();
            handle.wait_ready().unwrap();
            let addr = handle.local_addr();
            Self {
                handle: Some(handle),
                addr,
            }
        }

        pub fn stop(mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }
}
