//! Flow-controlled sending of request messages.

use crate::error::CallError;
use crate::flow::{OutgoingFlowControl, split_grant};
use crate::frame::encode_message;
use crate::metrics;
use crate::transport::Http2Stream;

use bytes::Bytes;
use prost::Message;
use tracing::trace;

/// Frame `message` and send it on `stream`.
///
/// Returns once every byte has been handed to the transport.
pub async fn send_message<S, CO, M>(
    conn_out: &CO,
    stream: &S,
    stream_out: &S::Outgoing,
    message: &M,
    end_stream: bool,
) -> Result<(), CallError>
where
    S: Http2Stream,
    CO: OutgoingFlowControl,
    M: Message,
{
    send_bytes(conn_out, stream, stream_out, encode_message(message), end_stream).await?;
    metrics::MESSAGES_SENT.increment();
    Ok(())
}

/// Send `data` on `stream`, splitting it to fit the available credit.
///
/// Each step withdraws credit from the stream window, then withdraws the
/// stream grant from the connection window. Stream credit the connection
/// could not match goes back before the step's bytes are sent. Only the
/// final step carries `end_stream`.
///
/// Empty `data` with `end_stream` sends a single empty DATA frame and
/// withdraws nothing.
pub async fn send_bytes<S, CO>(
    conn_out: &CO,
    stream: &S,
    stream_out: &S::Outgoing,
    mut data: Bytes,
    end_stream: bool,
) -> Result<(), CallError>
where
    S: Http2Stream,
    CO: OutgoingFlowControl,
{
    if data.is_empty() {
        if end_stream {
            trace!(stream_id = stream.id(), "sending end of stream");
            stream
                .send_data(Bytes::new(), true)
                .await
                .map_err(CallError::transport)?;
        }
        return Ok(());
    }

    while !data.is_empty() {
        let wanted = data.len();
        let stream_granted = stream_out.withdraw_credit(wanted).await;
        let conn_granted = conn_out.withdraw_credit(stream_granted).await;
        let grant = split_grant(wanted, stream_granted, conn_granted);

        if grant.refund > 0 {
            stream_out.receive_credit(grant.refund);
        }

        let last = grant.is_complete(wanted);
        let chunk = data.split_to(grant.send);
        trace!(
            stream_id = stream.id(),
            len = chunk.len(),
            refund = grant.refund,
            remaining = data.len(),
            end_stream = last && end_stream,
            "sending data"
        );

        let len = chunk.len() as u64;
        stream
            .send_data(chunk, last && end_stream)
            .await
            .map_err(CallError::transport)?;
        metrics::BYTES_SENT.add(len);
    }

    Ok(())
}
