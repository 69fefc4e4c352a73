//! ATT Protocol Data Units
//!
//! The ATT PDU universe is closed, so it is modeled as one tagged `enum` rather than the
//! parameterized `Pdu<P>` wrapper the opcode/parameter split once suggested. Every variant
//! carries exactly the fields the Bluetooth Core Specification, Vol. 3, Part F defines for that
//! opcode. `encode`/`decode` are the only entry points; there is no partial or streaming decode.

use core::convert::TryFrom;

use crate::att::error::{AttError, ErrorCode};
use crate::att::opcode::Method;
use crate::uuid::Uuid;

/// The `flags` field of an Execute Write Request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteWriteFlag {
    Cancel,
    Write,
}

impl ExecuteWriteFlag {
    fn raw(&self) -> u8 {
        match self {
            ExecuteWriteFlag::Cancel => 0x00,
            ExecuteWriteFlag::Write => 0x01,
        }
    }

    fn from_raw(val: u8) -> Option<ExecuteWriteFlag> {
        match val {
            0x00 => Some(ExecuteWriteFlag::Cancel),
            0x01 => Some(ExecuteWriteFlag::Write),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pdu {
    ErrorResponse {
        request_opcode: u8,
        handle: u16,
        error_code: ErrorCode,
    },
    ExchangeMtuRequest {
        client_rx_mtu: u16,
    },
    ExchangeMtuResponse {
        server_rx_mtu: u16,
    },
    FindInformationRequest {
        start_handle: u16,
        end_handle: u16,
    },
    FindInformationResponse {
        info: Vec<(u16, Uuid)>,
    },
    FindByTypeValueRequest {
        start_handle: u16,
        end_handle: u16,
        attr_type: u16,
        attr_value: Vec<u8>,
    },
    FindByTypeValueResponse {
        handles_info: Vec<(u16, u16)>,
    },
    ReadByTypeRequest {
        start_handle: u16,
        end_handle: u16,
        attr_type: Uuid,
    },
    ReadByTypeResponse {
        data_list: Vec<(u16, Vec<u8>)>,
    },
    ReadRequest {
        handle: u16,
    },
    ReadResponse {
        value: Vec<u8>,
    },
    ReadBlobRequest {
        handle: u16,
        offset: u16,
    },
    ReadBlobResponse {
        value: Vec<u8>,
    },
    ReadMultipleRequest {
        handles: Vec<u16>,
    },
    ReadMultipleResponse {
        values: Vec<u8>,
    },
    ReadByGroupTypeRequest {
        start_handle: u16,
        end_handle: u16,
        group_type: Uuid,
    },
    ReadByGroupTypeResponse {
        data_list: Vec<(u16, u16, Vec<u8>)>,
    },
    WriteRequest {
        handle: u16,
        value: Vec<u8>,
    },
    WriteResponse,
    WriteCommand {
        handle: u16,
        value: Vec<u8>,
    },
    PrepareWriteRequest {
        handle: u16,
        offset: u16,
        value: Vec<u8>,
    },
    PrepareWriteResponse {
        handle: u16,
        offset: u16,
        value: Vec<u8>,
    },
    ExecuteWriteRequest {
        flags: ExecuteWriteFlag,
    },
    ExecuteWriteResponse,
    HandleValueNotification {
        handle: u16,
        value: Vec<u8>,
    },
    HandleValueIndication {
        handle: u16,
        value: Vec<u8>,
    },
    HandleValueConfirmation,
    SignedWriteCommand {
        handle: u16,
        value: Vec<u8>,
        signature: [u8; 12],
    },
}

fn u16_le(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

impl Pdu {
    pub fn method(&self) -> Method {
        match self {
            Pdu::ErrorResponse { .. } => Method::ErrorResponse,
            Pdu::ExchangeMtuRequest { .. } => Method::ExchangeMtuRequest,
            Pdu::ExchangeMtuResponse { .. } => Method::ExchangeMtuResponse,
            Pdu::FindInformationRequest { .. } => Method::FindInformationRequest,
            Pdu::FindInformationResponse { .. } => Method::FindInformationResponse,
            Pdu::FindByTypeValueRequest { .. } => Method::FindByTypeValueRequest,
            Pdu::FindByTypeValueResponse { .. } => Method::FindByTypeValueResponse,
            Pdu::ReadByTypeRequest { .. } => Method::ReadByTypeRequest,
            Pdu::ReadByTypeResponse { .. } => Method::ReadByTypeResponse,
            Pdu::ReadRequest { .. } => Method::ReadRequest,
            Pdu::ReadResponse { .. } => Method::ReadResponse,
            Pdu::ReadBlobRequest { .. } => Method::ReadBlobRequest,
            Pdu::ReadBlobResponse { .. } => Method::ReadBlobResponse,
            Pdu::ReadMultipleRequest { .. } => Method::ReadMultipleRequest,
            Pdu::ReadMultipleResponse { .. } => Method::ReadMultipleResponse,
            Pdu::ReadByGroupTypeRequest { .. } => Method::ReadByGroupTypeRequest,
            Pdu::ReadByGroupTypeResponse { .. } => Method::ReadByGroupTypeResponse,
            Pdu::WriteRequest { .. } => Method::WriteRequest,
            Pdu::WriteResponse => Method::WriteResponse,
            Pdu::WriteCommand { .. } => Method::WriteCommand,
            Pdu::PrepareWriteRequest { .. } => Method::PrepareWriteRequest,
            Pdu::PrepareWriteResponse { .. } => Method::PrepareWriteResponse,
            Pdu::ExecuteWriteRequest { .. } => Method::ExecuteWriteRequest,
            Pdu::ExecuteWriteResponse => Method::ExecuteWriteResponse,
            Pdu::HandleValueNotification { .. } => Method::HandleValueNotification,
            Pdu::HandleValueIndication { .. } => Method::HandleValueIndication,
            Pdu::HandleValueConfirmation => Method::HandleValueConfirmation,
            Pdu::SignedWriteCommand { .. } => Method::SignedWriteCommand,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.method().opcode_byte()];

        match self {
            Pdu::ErrorResponse { request_opcode, handle, error_code } => {
                out.push(*request_opcode);
                out.extend_from_slice(&handle.to_le_bytes());
                out.push(error_code.raw());
            }
            Pdu::ExchangeMtuRequest { client_rx_mtu } => out.extend_from_slice(&client_rx_mtu.to_le_bytes()),
            Pdu::ExchangeMtuResponse { server_rx_mtu } => out.extend_from_slice(&server_rx_mtu.to_le_bytes()),
            Pdu::FindInformationRequest { start_handle, end_handle } => {
                out.extend_from_slice(&start_handle.to_le_bytes());
                out.extend_from_slice(&end_handle.to_le_bytes());
            }
            Pdu::FindInformationResponse { info } => {
                let format: u8 = if info.iter().any(|(_, u)| u.wire_width() == 16) { 2 } else { 1 };
                out.push(format);
                for (handle, uuid) in info {
                    out.extend_from_slice(&handle.to_le_bytes());
                    if format == 1 {
                        out.extend_from_slice(&u16::try_from(*uuid).unwrap_or(0).to_le_bytes());
                    } else {
                        out.extend_from_slice(&uuid.as_u128().to_le_bytes());
                    }
                }
            }
            Pdu::FindByTypeValueRequest { start_handle, end_handle, attr_type, attr_value } => {
                out.extend_from_slice(&start_handle.to_le_bytes());
                out.extend_from_slice(&end_handle.to_le_bytes());
                out.extend_from_slice(&attr_type.to_le_bytes());
                out.extend_from_slice(attr_value);
            }
            Pdu::FindByTypeValueResponse { handles_info } => {
                for (found, group_end) in handles_info {
                    out.extend_from_slice(&found.to_le_bytes());
                    out.extend_from_slice(&group_end.to_le_bytes());
                }
            }
            Pdu::ReadByTypeRequest { start_handle, end_handle, attr_type } => {
                out.extend_from_slice(&start_handle.to_le_bytes());
                out.extend_from_slice(&end_handle.to_le_bytes());
                out.extend_from_slice(&attr_type.to_le_bytes());
            }
            Pdu::ReadByTypeResponse { data_list } => {
                let stride = data_list.first().map(|(_, v)| 2 + v.len()).unwrap_or(2) as u8;
                out.push(stride);
                for (handle, value) in data_list {
                    out.extend_from_slice(&handle.to_le_bytes());
                    out.extend_from_slice(value);
                }
            }
            Pdu::ReadRequest { handle } => out.extend_from_slice(&handle.to_le_bytes()),
            Pdu::ReadResponse { value } => out.extend_from_slice(value),
            Pdu::ReadBlobRequest { handle, offset } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
            }
            Pdu::ReadBlobResponse { value } => out.extend_from_slice(value),
            Pdu::ReadMultipleRequest { handles } => {
                for handle in handles {
                    out.extend_from_slice(&handle.to_le_bytes());
                }
            }
            Pdu::ReadMultipleResponse { values } => out.extend_from_slice(values),
            Pdu::ReadByGroupTypeRequest { start_handle, end_handle, group_type } => {
                out.extend_from_slice(&start_handle.to_le_bytes());
                out.extend_from_slice(&end_handle.to_le_bytes());
                out.extend_from_slice(&group_type.to_le_bytes());
            }
            Pdu::ReadByGroupTypeResponse { data_list } => {
                let stride = data_list.first().map(|(_, _, v)| 4 + v.len()).unwrap_or(4) as u8;
                out.push(stride);
                for (start, end, value) in data_list {
                    out.extend_from_slice(&start.to_le_bytes());
                    out.extend_from_slice(&end.to_le_bytes());
                    out.extend_from_slice(value);
                }
            }
            Pdu::WriteRequest { handle, value } | Pdu::WriteCommand { handle, value } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
            }
            Pdu::WriteResponse => {}
            Pdu::PrepareWriteRequest { handle, offset, value }
            | Pdu::PrepareWriteResponse { handle, offset, value } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(value);
            }
            Pdu::ExecuteWriteRequest { flags } => out.push(flags.raw()),
            Pdu::ExecuteWriteResponse => {}
            Pdu::HandleValueNotification { handle, value } | Pdu::HandleValueIndication { handle, value } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
            }
            Pdu::HandleValueConfirmation => {}
            Pdu::SignedWriteCommand { handle, value, signature } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
                out.extend_from_slice(signature);
            }
        }

        out
    }

    pub fn decode(raw: &[u8]) -> Result<Pdu, AttError> {
        if raw.is_empty() {
            return Err(AttError::Malformed);
        }

        let method = Method::try_from(raw[0]).map_err(|_| AttError::Malformed)?;
        let body = &raw[1..];

        match method {
            Method::ErrorResponse => {
                if body.len() != 4 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::ErrorResponse {
                    request_opcode: body[0],
                    handle: u16_le(body, 1),
                    error_code: ErrorCode::from_raw(body[3]),
                })
            }
            Method::ExchangeMtuRequest => {
                if body.len() != 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::ExchangeMtuRequest { client_rx_mtu: u16_le(body, 0) })
            }
            Method::ExchangeMtuResponse => {
                if body.len() != 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::ExchangeMtuResponse { server_rx_mtu: u16_le(body, 0) })
            }
            Method::FindInformationRequest => {
                if body.len() != 4 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::FindInformationRequest {
                    start_handle: u16_le(body, 0),
                    end_handle: u16_le(body, 2),
                })
            }
            Method::FindInformationResponse => {
                if body.is_empty() {
                    return Err(AttError::Malformed);
                }
                let width = match body[0] {
                    1 => 2,
                    2 => 16,
                    _ => return Err(AttError::Malformed),
                };
                let pairs = &body[1..];
                let stride = 2 + width;
                if stride == 0 || pairs.len() % stride != 0 {
                    return Err(AttError::Malformed);
                }
                let mut info = Vec::new();
                for chunk in pairs.chunks(stride) {
                    let handle = u16_le(chunk, 0);
                    let uuid = Uuid::from_le_bytes(&chunk[2..]).ok_or(AttError::Malformed)?;
                    info.push((handle, uuid));
                }
                Ok(Pdu::FindInformationResponse { info })
            }
            Method::FindByTypeValueRequest => {
                if body.len() < 6 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::FindByTypeValueRequest {
                    start_handle: u16_le(body, 0),
                    end_handle: u16_le(body, 2),
                    attr_type: u16_le(body, 4),
                    attr_value: body[6..].to_vec(),
                })
            }
            Method::FindByTypeValueResponse => {
                if body.len() % 4 != 0 {
                    return Err(AttError::Malformed);
                }
                let handles_info = body.chunks(4).map(|c| (u16_le(c, 0), u16_le(c, 2))).collect();
                Ok(Pdu::FindByTypeValueResponse { handles_info })
            }
            Method::ReadByTypeRequest => {
                if body.len() != 6 && body.len() != 20 {
                    return Err(AttError::Malformed);
                }
                let attr_type = Uuid::from_le_bytes(&body[4..]).ok_or(AttError::Malformed)?;
                Ok(Pdu::ReadByTypeRequest {
                    start_handle: u16_le(body, 0),
                    end_handle: u16_le(body, 2),
                    attr_type,
                })
            }
            Method::ReadByTypeResponse => {
                if body.is_empty() {
                    return Err(AttError::Malformed);
                }
                let stride = body[0] as usize;
                if stride < 2 {
                    return Err(AttError::Malformed);
                }
                let pairs = &body[1..];
                if pairs.len() % stride != 0 {
                    return Err(AttError::Malformed);
                }
                let data_list = pairs
                    .chunks(stride)
                    .map(|c| (u16_le(c, 0), c[2..].to_vec()))
                    .collect();
                Ok(Pdu::ReadByTypeResponse { data_list })
            }
            Method::ReadRequest => {
                if body.len() != 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::ReadRequest { handle: u16_le(body, 0) })
            }
            Method::ReadResponse => Ok(Pdu::ReadResponse { value: body.to_vec() }),
            Method::ReadBlobRequest => {
                if body.len() != 4 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::ReadBlobRequest { handle: u16_le(body, 0), offset: u16_le(body, 2) })
            }
            Method::ReadBlobResponse => Ok(Pdu::ReadBlobResponse { value: body.to_vec() }),
            Method::ReadMultipleRequest => {
                if body.len() < 4 || body.len() % 2 != 0 {
                    return Err(AttError::Malformed);
                }
                let handles = body.chunks(2).map(|c| u16_le(c, 0)).collect();
                Ok(Pdu::ReadMultipleRequest { handles })
            }
            Method::ReadMultipleResponse => Ok(Pdu::ReadMultipleResponse { values: body.to_vec() }),
            Method::ReadByGroupTypeRequest => {
                if body.len() != 6 && body.len() != 20 {
                    return Err(AttError::Malformed);
                }
                let group_type = Uuid::from_le_bytes(&body[4..]).ok_or(AttError::Malformed)?;
                Ok(Pdu::ReadByGroupTypeRequest {
                    start_handle: u16_le(body, 0),
                    end_handle: u16_le(body, 2),
                    group_type,
                })
            }
            Method::ReadByGroupTypeResponse => {
                if body.is_empty() {
                    return Err(AttError::Malformed);
                }
                let stride = body[0] as usize;
                if stride < 4 {
                    return Err(AttError::Malformed);
                }
                let pairs = &body[1..];
                if pairs.len() % stride != 0 {
                    return Err(AttError::Malformed);
                }
                let data_list = pairs
                    .chunks(stride)
                    .map(|c| (u16_le(c, 0), u16_le(c, 2), c[4..].to_vec()))
                    .collect();
                Ok(Pdu::ReadByGroupTypeResponse { data_list })
            }
            Method::WriteRequest => {
                if body.len() < 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::WriteRequest { handle: u16_le(body, 0), value: body[2..].to_vec() })
            }
            Method::WriteResponse => {
                if !body.is_empty() {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::WriteResponse)
            }
            Method::WriteCommand => {
                if body.len() < 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::WriteCommand { handle: u16_le(body, 0), value: body[2..].to_vec() })
            }
            Method::PrepareWriteRequest => {
                if body.len() < 4 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::PrepareWriteRequest {
                    handle: u16_le(body, 0),
                    offset: u16_le(body, 2),
                    value: body[4..].to_vec(),
                })
            }
            Method::PrepareWriteResponse => {
                if body.len() < 4 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::PrepareWriteResponse {
                    handle: u16_le(body, 0),
                    offset: u16_le(body, 2),
                    value: body[4..].to_vec(),
                })
            }
            Method::ExecuteWriteRequest => {
                if body.len() != 1 {
                    return Err(AttError::Malformed);
                }
                let flags = ExecuteWriteFlag::from_raw(body[0]).ok_or(AttError::Malformed)?;
                Ok(Pdu::ExecuteWriteRequest { flags })
            }
            Method::ExecuteWriteResponse => {
                if !body.is_empty() {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::ExecuteWriteResponse)
            }
            Method::HandleValueNotification => {
                if body.len() < 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::HandleValueNotification { handle: u16_le(body, 0), value: body[2..].to_vec() })
            }
            Method::HandleValueIndication => {
                if body.len() < 2 {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::HandleValueIndication { handle: u16_le(body, 0), value: body[2..].to_vec() })
            }
            Method::HandleValueConfirmation => {
                if !body.is_empty() {
                    return Err(AttError::Malformed);
                }
                Ok(Pdu::HandleValueConfirmation)
            }
            Method::SignedWriteCommand => {
                if body.len() < 14 {
                    return Err(AttError::Malformed);
                }
                let sig_start = body.len() - 12;
                let mut signature = [0u8; 12];
                signature.copy_from_slice(&body[sig_start..]);
                Ok(Pdu::SignedWriteCommand {
                    handle: u16_le(body, 0),
                    value: body[2..sig_start].to_vec(),
                    signature,
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_response_round_trips() {
        let pdu = Pdu::ErrorResponse {
            request_opcode: 0x10,
            handle: 0x000B,
            error_code: ErrorCode::AttributeNotFound,
        };
        let encoded = pdu.encode();
        assert_eq!(encoded, vec![0x01, 0x10, 0x0B, 0x00, 0x0A]);
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn exchange_mtu_request_round_trips() {
        let pdu = Pdu::ExchangeMtuRequest { client_rx_mtu: 23 };
        assert_eq!(pdu.encode(), vec![0x02, 0x17, 0x00]);
        assert_eq!(Pdu::decode(&pdu.encode()).unwrap(), pdu);
    }

    #[test]
    fn fixed_length_pdu_rejects_wrong_length() {
        assert!(matches!(Pdu::decode(&[0x02, 0x17]), Err(AttError::Malformed)));
        assert!(matches!(Pdu::decode(&[0x02, 0x17, 0x00, 0x00]), Err(AttError::Malformed)));
    }

    #[test]
    fn find_information_response_rejects_bad_stride() {
        // format=1 (16-bit pairs, stride 4), one byte short of a full pair.
        assert!(matches!(
            Pdu::decode(&[0x05, 0x01, 0x01, 0x00, 0x00]),
            Err(AttError::Malformed)
        ));
    }

    #[test]
    fn find_information_response_round_trips_16_bit() {
        let pdu = Pdu::FindInformationResponse {
            info: vec![(0x0001, Uuid::from_u16(0x2800)), (0x0002, Uuid::from_u16(0x2803))],
        };
        let encoded = pdu.encode();
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn read_by_group_type_response_round_trips() {
        let pdu = Pdu::ReadByGroupTypeResponse {
            data_list: vec![
                (0x0001, 0x0005, vec![0x00, 0x18]),
                (0x0006, 0x000A, vec![0x01, 0x18]),
            ],
        };
        let encoded = pdu.encode();
        assert_eq!(
            encoded,
            vec![0x11, 0x06, 0x01, 0x00, 0x05, 0x00, 0x00, 0x18, 0x06, 0x00, 0x0A, 0x00, 0x01, 0x18]
        );
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn read_by_group_type_response_rejects_bad_stride() {
        // declares stride 5 but carries only 4 trailing bytes.
        assert!(matches!(
            Pdu::decode(&[0x11, 0x05, 0x01, 0x00, 0x05, 0x00]),
            Err(AttError::Malformed)
        ));
    }

    #[test]
    fn read_by_group_type_response_round_trips_empty_data_list() {
        let pdu = Pdu::ReadByGroupTypeResponse { data_list: vec![] };
        let encoded = pdu.encode();
        assert_eq!(encoded, vec![0x11, 0x04]);
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn read_by_type_response_round_trips_empty_data_list() {
        let pdu = Pdu::ReadByTypeResponse { data_list: vec![] };
        let encoded = pdu.encode();
        assert_eq!(encoded, vec![0x09, 0x02]);
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn write_command_round_trips() {
        let pdu = Pdu::WriteCommand { handle: 0x0003, value: vec![0xAA, 0xBB] };
        let encoded = pdu.encode();
        assert_eq!(encoded[0], 0x52);
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn signed_write_command_splits_value_from_signature() {
        let pdu = Pdu::SignedWriteCommand {
            handle: 0x0003,
            value: vec![0x01, 0x02, 0x03],
            signature: [0xAB; 12],
        };
        let encoded = pdu.encode();
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn handle_value_confirmation_has_no_body() {
        let pdu = Pdu::HandleValueConfirmation;
        assert_eq!(pdu.encode(), vec![0x1E]);
        assert_eq!(Pdu::decode(&[0x1E]).unwrap(), pdu);
        assert!(matches!(Pdu::decode(&[0x1E, 0x00]), Err(AttError::Malformed)));
    }

    #[test]
    fn read_multiple_request_requires_even_handle_bytes() {
        assert!(matches!(Pdu::decode(&[0x0E, 0x01, 0x00, 0x02]), Err(AttError::Malformed)));
        let pdu = Pdu::ReadMultipleRequest { handles: vec![0x0001, 0x0002] };
        let encoded = pdu.encode();
        assert_eq!(encoded, vec![0x0E, 0x01, 0x00, 0x02, 0x00]);
        assert_eq!(Pdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn unknown_opcode_is_malformed() {
        assert!(matches!(Pdu::decode(&[0x00]), Err(AttError::Malformed)));
    }
}
