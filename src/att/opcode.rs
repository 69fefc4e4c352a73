//! ATT opcode byte layout
//!
//! Bits 0-5 of the opcode byte select the method; bit 6 is the "command" flag (the PDU has no
//! response); bit 7 is the "authentication signature present" flag. `Opcode` keeps the method
//! name and the two flags apart so the codec can dispatch on the method without re-deriving the
//! flags by hand at every call site.

use core::convert::TryFrom;
use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    ErrorResponse,
    ExchangeMtuRequest,
    ExchangeMtuResponse,
    FindInformationRequest,
    FindInformationResponse,
    FindByTypeValueRequest,
    FindByTypeValueResponse,
    ReadByTypeRequest,
    ReadByTypeResponse,
    ReadRequest,
    ReadResponse,
    ReadBlobRequest,
    ReadBlobResponse,
    ReadMultipleRequest,
    ReadMultipleResponse,
    ReadByGroupTypeRequest,
    ReadByGroupTypeResponse,
    WriteRequest,
    WriteResponse,
    WriteCommand,
    PrepareWriteRequest,
    PrepareWriteResponse,
    ExecuteWriteRequest,
    ExecuteWriteResponse,
    HandleValueNotification,
    HandleValueIndication,
    HandleValueConfirmation,
    SignedWriteCommand,
}

impl Method {
    /// The low six bits identifying this method, independent of the command/signed flags.
    fn base_value(&self) -> u8 {
        use Method::*;
        match self {
            ErrorResponse => 0x01,
            ExchangeMtuRequest => 0x02,
            ExchangeMtuResponse => 0x03,
            FindInformationRequest => 0x04,
            FindInformationResponse => 0x05,
            FindByTypeValueRequest => 0x06,
            FindByTypeValueResponse => 0x07,
            ReadByTypeRequest => 0x08,
            ReadByTypeResponse => 0x09,
            ReadRequest => 0x0A,
            ReadResponse => 0x0B,
            ReadBlobRequest => 0x0C,
            ReadBlobResponse => 0x0D,
            ReadMultipleRequest => 0x0E,
            ReadMultipleResponse => 0x0F,
            ReadByGroupTypeRequest => 0x10,
            ReadByGroupTypeResponse => 0x11,
            WriteRequest => 0x12,
            WriteResponse => 0x13,
            WriteCommand => 0x12,
            PrepareWriteRequest => 0x16,
            PrepareWriteResponse => 0x17,
            ExecuteWriteRequest => 0x18,
            ExecuteWriteResponse => 0x19,
            HandleValueNotification => 0x1B,
            HandleValueIndication => 0x1D,
            HandleValueConfirmation => 0x1E,
            SignedWriteCommand => 0x12,
        }
    }

    fn is_command(&self) -> bool {
        matches!(self, Method::WriteCommand | Method::SignedWriteCommand)
    }

    fn is_signed(&self) -> bool {
        matches!(self, Method::SignedWriteCommand)
    }

    /// The full opcode byte this method is sent as.
    pub fn opcode_byte(&self) -> u8 {
        self.base_value()
            | if self.is_command() { 1 << 6 } else { 0 }
            | if self.is_signed() { 1 << 7 } else { 0 }
    }

    pub fn is_response(&self) -> bool {
        use Method::*;
        matches!(
            self,
            ErrorResponse
                | ExchangeMtuResponse
                | FindInformationResponse
                | FindByTypeValueResponse
                | ReadByTypeResponse
                | ReadResponse
                | ReadBlobResponse
                | ReadMultipleResponse
                | ReadByGroupTypeResponse
                | WriteResponse
                | PrepareWriteResponse
                | ExecuteWriteResponse
        )
    }
}

impl TryFrom<u8> for Method {
    type Error = ();

    fn try_from(raw: u8) -> Result<Self, ()> {
        let command = raw & (1 << 6) != 0;
        let signed = raw & (1 << 7) != 0;
        let base = raw & 0x3F;

        use Method::*;
        match (base, command, signed) {
            (0x01, false, false) => Ok(ErrorResponse),
            (0x02, false, false) => Ok(ExchangeMtuRequest),
            (0x03, false, false) => Ok(ExchangeMtuResponse),
            (0x04, false, false) => Ok(FindInformationRequest),
            (0x05, false, false) => Ok(FindInformationResponse),
            (0x06, false, false) => Ok(FindByTypeValueRequest),
            (0x07, false, false) => Ok(FindByTypeValueResponse),
            (0x08, false, false) => Ok(ReadByTypeRequest),
            (0x09, false, false) => Ok(ReadByTypeResponse),
            (0x0A, false, false) => Ok(ReadRequest),
            (0x0B, false, false) => Ok(ReadResponse),
            (0x0C, false, false) => Ok(ReadBlobRequest),
            (0x0D, false, false) => Ok(ReadBlobResponse),
            (0x0E, false, false) => Ok(ReadMultipleRequest),
            (0x0F, false, false) => Ok(ReadMultipleResponse),
            (0x10, false, false) => Ok(ReadByGroupTypeRequest),
            (0x11, false, false) => Ok(ReadByGroupTypeResponse),
            (0x12, false, false) => Ok(WriteRequest),
            (0x13, false, false) => Ok(WriteResponse),
            (0x12, true, false) => Ok(WriteCommand),
            (0x16, false, false) => Ok(PrepareWriteRequest),
            (0x17, false, false) => Ok(PrepareWriteResponse),
            (0x18, false, false) => Ok(ExecuteWriteRequest),
            (0x19, false, false) => Ok(ExecuteWriteResponse),
            (0x1B, false, false) => Ok(HandleValueNotification),
            (0x1D, false, false) => Ok(HandleValueIndication),
            (0x1E, false, false) => Ok(HandleValueConfirmation),
            (0x12, true, true) => Ok(SignedWriteCommand),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Method::*;
        let name = match self {
            ErrorResponse => "Error Response",
            ExchangeMtuRequest => "Exchange MTU Request",
            ExchangeMtuResponse => "Exchange MTU Response",
            FindInformationRequest => "Find Information Request",
            FindInformationResponse => "Find Information Response",
            FindByTypeValueRequest => "Find By Type Value Request",
            FindByTypeValueResponse => "Find By Type Value Response",
            ReadByTypeRequest => "Read By Type Request",
            ReadByTypeResponse => "Read By Type Response",
            ReadRequest => "Read Request",
            ReadResponse => "Read Response",
            ReadBlobRequest => "Read Blob Request",
            ReadBlobResponse => "Read Blob Response",
            ReadMultipleRequest => "Read Multiple Request",
            ReadMultipleResponse => "Read Multiple Response",
            ReadByGroupTypeRequest => "Read By Group Type Request",
            ReadByGroupTypeResponse => "Read By Group Type Response",
            WriteRequest => "Write Request",
            WriteResponse => "Write Response",
            WriteCommand => "Write Command",
            PrepareWriteRequest => "Prepare Write Request",
            PrepareWriteResponse => "Prepare Write Response",
            ExecuteWriteRequest => "Execute Write Request",
            ExecuteWriteResponse => "Execute Write Response",
            HandleValueNotification => "Handle Value Notification",
            HandleValueIndication => "Handle Value Indication",
            HandleValueConfirmation => "Handle Value Confirmation",
            SignedWriteCommand => "Signed Write Command",
        };
        write!(f, "{}", name)
    }
}
