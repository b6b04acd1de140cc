/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! One byte header framing.
//!
//! A frame is `[0x80 | len] ++ payload` with `len <= 127`. The high bit is
//! reserved as the sync marker: a receiver hunting for a header drops every
//! byte that lacks it. There is no checksum, so a corrupted header that still
//! carries the high bit makes the receiver read the wrong number of payload
//! bytes. That stays as is; the peer firmware speaks exactly this format.

use crate::consts::{HEADER_FLAG, LENGTH_MASK, MAX_PAYLOAD_LENGTH, RESYNC_YIELD_INTERVAL};
use crate::error::{LinkError, TransportError};
use crate::transport::Transport;
use bytes::{Buf, BufMut, BytesMut};
use log::{debug, trace};
use tokio_util::codec::{Decoder, Encoder};

/// True if `byte` may start a frame.
#[inline]
pub fn is_header(byte: u8) -> bool {
    byte & HEADER_FLAG != 0
}

/// Calculate and prepend the header on given payload.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    if payload.len() > MAX_PAYLOAD_LENGTH {
        return Err(LinkError::PayloadTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(HEADER_FLAG | payload.len() as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one frame from the transport and return its payload.
///
/// Bytes without the high bit set are discarded until a header shows up.
/// There is no bound on how long that takes. Any read failure is returned
/// as is; a partially read payload is never handed out.
pub async fn decode_one<T: Transport + ?Sized>(transport: &T) -> Result<Vec<u8>, TransportError> {
    let mut skipped = 0usize;
    let header = loop {
        let byte = match transport.read_exactly(1).await?.first() {
            Some(b) => *b,
            None => return Err(TransportError::Io("Transport returned a short read".to_string())),
        };
        if is_header(byte) {
            break byte;
        }

        skipped += 1;
        if skipped % RESYNC_YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    };

    if skipped > 0 {
        debug!("Resynchronized after skipping {} byte(s)", skipped);
    }

    let len = (header & LENGTH_MASK) as usize;
    if len == 0 {
        return Ok(vec![]);
    }

    let payload = transport.read_exactly(len).await?;
    if payload.len() != len {
        return Err(TransportError::Io(format!(
            "Transport returned {} of {} bytes",
            payload.len(),
            len
        )));
    }
    Ok(payload)
}

/// Stream framing for anything readable as a whole, e.g. a captured log
/// of the serial line. Same resync rules as [`decode_one`].
#[derive(Default)]
pub struct FrameCodec {
    skipped: usize,
    truncated: usize,
}

impl FrameCodec {
    /// Number of non-header bytes dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes of an unfinished frame left over when the stream ended.
    pub fn truncated(&self) -> usize {
        self.truncated
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = LinkError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<u8>>, LinkError> {
        let junk = buf
            .iter()
            .position(|b| is_header(*b))
            .unwrap_or(buf.len());
        if junk > 0 {
            trace!("Dropping {} byte(s) while hunting for a header", junk);
            buf.advance(junk);
            self.skipped += junk;
        }

        let header = match buf.first() {
            Some(h) => *h,
            None => return Ok(None),
        };

        let len = (header & LENGTH_MASK) as usize;
        if buf.len() < len + 1 {
            // Data is not ready yet.
            buf.reserve(len + 1 - buf.len());
            return Ok(None);
        }

        buf.advance(1);
        Ok(Some(buf.split_to(len).to_vec()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        // Captures routinely stop mid-frame.
        if !buf.is_empty() {
            debug!("Stream ended inside a frame, dropping {} byte(s)", buf.len());
            self.truncated += buf.len();
            buf.clear();
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = LinkError;

    fn encode(&mut self, data: &[u8], buf: &mut BytesMut) -> Result<(), LinkError> {
        if data.len() > MAX_PAYLOAD_LENGTH {
            return Err(LinkError::PayloadTooLarge(data.len()));
        }

        buf.reserve(data.len() + 1);
        buf.put_u8(HEADER_FLAG | data.len() as u8);
        buf.put_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::mock::connected_transport;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn check_basic_encode_frame() {
        let res = encode_frame(b"abc").unwrap();
        assert_eq!(res, vec![0x83, b'a', b'b', b'c']);
    }

    #[test]
    fn check_empty_frame() {
        assert_eq!(encode_frame(&[]).unwrap(), vec![0x80]);
    }

    #[test]
    fn check_largest_frame() {
        let payload = [0x41u8; 127];
        let res = encode_frame(&payload).unwrap();
        assert_eq!(res.len(), 128);
        assert_eq!(res[0], 0xFF);
        assert_eq!(&res[1..], &payload[..]);
    }

    #[test]
    fn check_encode_frame_ovf() {
        let payload = [0u8; 128];
        assert_eq!(encode_frame(&payload), Err(LinkError::PayloadTooLarge(128)));
    }

    #[tokio::test]
    async fn decode_one_roundtrip() {
        let (transport, mut peer) = connected_transport().await;
        let payloads: [&[u8]; 4] = [b"", b"x", &[0x7f; 64], &[0xAA; 127]];

        for payload in payloads {
            peer.write_all(&encode_frame(payload).unwrap()).await.unwrap();
            assert_eq!(decode_one(&transport).await.unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn decode_one_resyncs_on_junk() {
        let (transport, mut peer) = connected_transport().await;
        peer.write_all(&[0x01, 0x02, 0x83, b'a', b'b', b'c'])
            .await
            .unwrap();

        assert_eq!(decode_one(&transport).await.unwrap(), b"abc".to_vec());
    }

    #[tokio::test]
    async fn decode_one_skips_long_junk_runs() {
        let (transport, mut peer) = connected_transport().await;
        let mut wire = vec![0x20u8; RESYNC_YIELD_INTERVAL * 3 + 5];
        wire.extend_from_slice(&[0x82, b'o', b'k']);
        peer.write_all(&wire).await.unwrap();

        assert_eq!(decode_one(&transport).await.unwrap(), b"ok".to_vec());
    }

    #[tokio::test]
    async fn decode_one_never_returns_partial_payload() {
        let (transport, mut peer) = connected_transport().await;
        peer.write_all(&[0x85, b'a', b'b']).await.unwrap();
        drop(peer);

        assert_eq!(decode_one(&transport).await, Err(TransportError::Closed));
    }

    #[test]
    fn codec_waits_for_whole_frame() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x85, 0x01, 0x02, 0x03]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&[0x04, 0x05]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(vec![0x01, 0x02, 0x03, 0x04, 0x05])
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn codec_drops_junk_between_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x10, 0x81, b'a', 0x00, 0x7f, 0x80, 0x82, b'h', b'i']);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"a".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(vec![]));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"hi".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.skipped(), 3);
    }

    #[test]
    fn codec_drops_truncated_tail_at_eof() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x82, b'h', b'i', 0x85, b'a']);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(b"hi".to_vec()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
        assert_eq!(codec.truncated(), 2);
    }

    #[tokio::test]
    async fn framed_capture_ending_mid_frame() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let capture: &[u8] = &[0x01, 0x82, b'h', b'i', 0x85, b'a'];
        let mut frames = FramedRead::new(capture, FrameCodec::default());

        assert_eq!(frames.next().await, Some(Ok(b"hi".to_vec())));
        assert_eq!(frames.next().await, None);
        assert_eq!(frames.decoder().skipped(), 1);
        assert_eq!(frames.decoder().truncated(), 2);
    }

    #[test]
    fn codec_encoder_matches_encode_frame() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&b"Hallo"[..], &mut buf).unwrap();
        assert_eq!(buf.to_vec(), encode_frame(b"Hallo").unwrap());

        let too_big = [0u8; 200];
        assert_eq!(
            codec.encode(&too_big[..], &mut buf),
            Err(LinkError::PayloadTooLarge(200))
        );
    }
}
