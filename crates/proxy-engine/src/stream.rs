use bytes::Bytes;
use futures::Stream;

/// Wraps a [`reqwest::Response`] body in a line-buffered byte stream: each
/// yielded chunk ends at a newline (the upstream's SSE framing), so a
/// caller writing straight through to a client socket flushes after every
/// event line instead of waiting for TCP's own buffering.
pub fn line_buffered(resp: reqwest::Response) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
    futures::stream::unfold(
        (resp, Vec::<u8>::new(), false),
        |(mut resp, mut buf, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    return Some((Ok(Bytes::from(line)), (resp, buf, false)));
                }
                match resp.chunk().await {
                    Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                    Ok(None) => {
                        if buf.is_empty() {
                            return None;
                        }
                        let rest = std::mem::take(&mut buf);
                        return Some((Ok(Bytes::from(rest)), (resp, buf, true)));
                    }
                    Err(e) => return Some((Err(e), (resp, buf, true))),
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn splits_body_on_newlines() {
        use wiremock::matchers::path;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(path("/sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: one\ndata: two\ndata: three",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let resp = reqwest::get(format!("{}/sse", server.uri())).await.unwrap();
        let chunks: Vec<Bytes> = line_buffered(resp).map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0][..], b"data: one\n");
        assert_eq!(&chunks[1][..], b"data: two\n");
        assert_eq!(&chunks[2][..], b"data: three");
    }
}
