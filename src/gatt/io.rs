//! Read and write procedures over a discovered attribute: short/long reads, read-by-UUID,
//! read-multiple, and the write flavors (command, short request, long reliable-or-not).
//!
//! Every procedure here freely truncates outbound values to whatever the current MTU allows
//! (there is no separate "does it fit" check before sending; truncation and re-chunking
//! *are* the how). Completions are driven the same continuation-passing way as
//! `crate::gatt::discovery`.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::att::{AttError, ErrorCode, ExecuteWriteFlag, Pdu};
use crate::connection::Connection;
use crate::transport::Transport;
use crate::uuid::Uuid;

type Completion<R> = Box<dyn FnOnce(Result<R, AttError>)>;

/// Read an attribute's value. If the response fills the entire MTU (the server may be
/// truncating a longer value) the remainder is fetched with a Read Blob sequence automatically,
/// so the caller always gets the whole value in one call.
pub fn read<T: Transport + 'static>(connection: &mut Connection<T>, handle: u16, completion: Completion<Vec<u8>>) {
    let mtu = connection.mtu();

    connection.send_request(
        Pdu::ReadRequest { handle },
        Box::new(move |result, conn| match result {
            Ok(Pdu::ReadResponse { value }) => {
                if value.len() == (mtu - 1) as usize {
                    blob_step(conn, handle, value, completion);
                } else {
                    completion(Ok(value));
                }
            }
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

/// Read an attribute's value via an explicit Read Blob sequence starting at offset 0, for values
/// known in advance to be longer than one MTU's worth (or to re-read after a partial read).
pub fn read_long<T: Transport + 'static>(connection: &mut Connection<T>, handle: u16, completion: Completion<Vec<u8>>) {
    blob_step(connection, handle, Vec::new(), completion);
}

fn blob_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    handle: u16,
    acc: Vec<u8>,
    completion: Completion<Vec<u8>>,
) {
    let offset = acc.len() as u16;

    connection.send_request(
        Pdu::ReadBlobRequest { handle, offset },
        Box::new(move |result, conn| {
            let mtu = conn.mtu();
            match result {
                Ok(Pdu::ReadBlobResponse { value }) => {
                    let part_len = value.len();
                    let mut acc = acc;
                    acc.extend(value);

                    if part_len == (mtu - 1) as usize {
                        blob_step(conn, handle, acc, completion);
                    } else {
                        completion(Ok(acc));
                    }
                }
                Err(AttError::ErrorResponse { code: ErrorCode::InvalidOffset, .. }) if !acc.is_empty() => {
                    completion(Ok(acc))
                }
                Err(e) => completion(Err(e)),
                Ok(_) => completion(Err(AttError::InvalidResponse)),
            }
        }),
    );
}

/// Read every attribute of type `uuid` in `[start..end]`, returned as a handle-to-value map.
/// Terminates successfully on Attribute Not Found; any other error aborts.
pub fn read_by_uuid<T: Transport + 'static>(
    connection: &mut Connection<T>,
    uuid: Uuid,
    start: u16,
    end: u16,
    completion: Completion<BTreeMap<u16, Vec<u8>>>,
) {
    by_uuid_step(connection, uuid, start, end, BTreeMap::new(), completion);
}

fn by_uuid_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    uuid: Uuid,
    start: u16,
    end: u16,
    acc: BTreeMap<u16, Vec<u8>>,
    completion: Completion<BTreeMap<u16, Vec<u8>>>,
) {
    if start > end {
        return completion(Ok(acc));
    }

    connection.send_request(
        Pdu::ReadByTypeRequest { start_handle: start, end_handle: end, attr_type: uuid },
        Box::new(move |result, conn| match result {
            Ok(Pdu::ReadByTypeResponse { data_list }) => {
                if data_list.is_empty() {
                    return completion(Err(AttError::InvalidResponse));
                }

                let last_handle = data_list.last().unwrap().0;
                if last_handle < start {
                    return completion(Err(AttError::InvalidResponse));
                }

                let mut acc = acc;
                for (handle, value) in data_list {
                    acc.insert(handle, value);
                }

                by_uuid_step(conn, uuid, last_handle.saturating_add(1), end, acc, completion);
            }
            Err(AttError::ErrorResponse { code: ErrorCode::AttributeNotFound, .. }) => completion(Ok(acc)),
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

/// Read several attributes in one round trip. The response is an opaque concatenation of values
/// with no length prefixes (Vol. 3, Part F, Section 3.4.4.3); it's on the caller to know how to
/// split it, typically by a fixed per-handle width agreed out of band.
pub fn read_multiple<T: Transport + 'static>(
    connection: &mut Connection<T>,
    handles: Vec<u16>,
    completion: Completion<Vec<u8>>,
) {
    if handles.len() < 2 {
        return completion(Err(AttError::InvalidResponse));
    }

    connection.send_request(
        Pdu::ReadMultipleRequest { handles },
        Box::new(move |result, _conn| match result {
            Ok(Pdu::ReadMultipleResponse { values }) => completion(Ok(values)),
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

/// Write without a response. Silently truncated to `mtu - 3` bytes; there is no completion
/// because there is no response to wait for.
pub fn write_command<T: Transport>(connection: &mut Connection<T>, handle: u16, value: &[u8]) -> Result<(), AttError> {
    let max_len = (connection.mtu() as usize).saturating_sub(3);
    let truncated = if value.len() > max_len { &value[..max_len] } else { value };
    connection.send_command(Pdu::WriteCommand { handle, value: truncated.to_vec() })
}

/// Write with a response, for values that fit in one PDU. Truncated to `mtu - 3` bytes; use
/// `write_long` when the value must not be silently cut short.
pub fn write<T: Transport + 'static>(
    connection: &mut Connection<T>,
    handle: u16,
    value: &[u8],
    completion: Completion<()>,
) {
    let max_len = (connection.mtu() as usize).saturating_sub(3);
    let truncated = if value.len() > max_len { value[..max_len].to_vec() } else { value.to_vec() };

    connection.send_request(
        Pdu::WriteRequest { handle, value: truncated },
        Box::new(move |result, _conn| match result {
            Ok(Pdu::WriteResponse) => completion(Ok(())),
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

/// Write an arbitrarily long value via the Prepare Write / Execute Write queue. Only one long
/// write may be outstanding on a bearer at a time (`in_long_write`); a second call while one is
/// active fails immediately without touching the wire.
///
/// In `reliable` mode each Prepare Write response is checked against what was sent (handle,
/// offset, and value must all echo back exactly); a mismatch cancels the whole write
/// (Execute Write with the cancel flag) instead of committing a corrupted value.
pub fn write_long<T: Transport + 'static>(
    connection: &mut Connection<T>,
    in_long_write: Rc<Cell<bool>>,
    handle: u16,
    value: Vec<u8>,
    reliable: bool,
    completion: Completion<()>,
) {
    if in_long_write.get() {
        return completion(Err(AttError::InLongWrite));
    }

    let chunk_len = (connection.mtu() as usize).saturating_sub(5).max(1);
    let chunks: Vec<(u16, Vec<u8>)> = value
        .chunks(chunk_len)
        .enumerate()
        .map(|(i, chunk)| ((i * chunk_len) as u16, chunk.to_vec()))
        .collect();

    if chunks.is_empty() {
        return completion(Ok(()));
    }

    in_long_write.set(true);
    prepare_step(connection, in_long_write, handle, reliable, Rc::new(chunks), 0, completion);
}

fn prepare_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    in_long_write: Rc<Cell<bool>>,
    handle: u16,
    reliable: bool,
    chunks: Rc<Vec<(u16, Vec<u8>)>>,
    index: usize,
    completion: Completion<()>,
) {
    let (offset, part) = chunks[index].clone();

    connection.send_request(
        Pdu::PrepareWriteRequest { handle, offset, value: part.clone() },
        Box::new(move |result, conn| match result {
            Ok(Pdu::PrepareWriteResponse { handle: echo_handle, offset: echo_offset, value: echo_value }) => {
                if reliable && (echo_handle != handle || echo_offset != offset || echo_value != part) {
                    log::warn!("(GATT) prepare write echo mismatch at offset {}; cancelling long write", offset);
                    return cancel_step(conn, in_long_write, completion);
                }

                if index + 1 < chunks.len() {
                    prepare_step(conn, in_long_write, handle, reliable, chunks, index + 1, completion);
                } else {
                    execute_step(conn, in_long_write, completion);
                }
            }
            Err(e) => {
                in_long_write.set(false);
                completion(Err(e));
            }
            Ok(_) => {
                in_long_write.set(false);
                completion(Err(AttError::InvalidResponse));
            }
        }),
    );
}

fn cancel_step<T: Transport + 'static>(connection: &mut Connection<T>, in_long_write: Rc<Cell<bool>>, completion: Completion<()>) {
    connection.send_request(
        Pdu::ExecuteWriteRequest { flags: ExecuteWriteFlag::Cancel },
        Box::new(move |result, _conn| {
            in_long_write.set(false);
            match result {
                Ok(Pdu::ExecuteWriteResponse) => completion(Err(AttError::InvalidResponse)),
                Err(e) => completion(Err(e)),
                Ok(_) => completion(Err(AttError::InvalidResponse)),
            }
        }),
    );
}

fn execute_step<T: Transport + 'static>(connection: &mut Connection<T>, in_long_write: Rc<Cell<bool>>, completion: Completion<()>) {
    connection.send_request(
        Pdu::ExecuteWriteRequest { flags: ExecuteWriteFlag::Write },
        Box::new(move |result, _conn| {
            in_long_write.set(false);
            match result {
                Ok(Pdu::ExecuteWriteResponse) => completion(Ok(())),
                Err(e) => completion(Err(e)),
                Ok(_) => completion(Err(AttError::InvalidResponse)),
            }
        }),
    );
}
