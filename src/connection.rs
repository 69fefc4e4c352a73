//! The ATT connection engine.
//!
//! Owns the transport, the current effective MTU, the single "pending response" slot, and the
//! FIFO queue of requests still waiting to go out. `run_read` is the only thing that drives
//! dispatch: it pulls one message off the transport and matches it against the pending
//! transaction, a registered notification/indication handler, or discards it as malformed.
//!
//! A request's completion is handed `&mut Connection` alongside its result so that a multi-round-
//! trip procedure (see `crate::gatt`) can enqueue its next request from directly inside the
//! previous one's completion, without going through a `RefCell` (which would double-borrow: the
//! completion runs while `run_read`'s own `&mut self` is still on the stack). Anything a
//! procedure needs beyond the bearer itself (the cache, a long-write flag, notification routing)
//! is captured by the closure as its own `Rc<RefCell<_>>` clone, entirely independent of
//! `Connection`'s internals.

use std::collections::VecDeque;

use crate::att::{AttError, ErrorCode, Method, Pdu, MIN_ATT_MTU};
use crate::transport::Transport;

pub type RequestCompletion<T> = Box<dyn FnOnce(Result<Pdu, AttError>, &mut Connection<T>)>;
pub type NotificationHandler = Box<dyn FnMut(u16, Vec<u8>)>;
pub type IndicationHandler = Box<dyn FnMut(u16, Vec<u8>)>;

struct QueuedRequest<T: Transport> {
    pdu: Pdu,
    expected_response: Method,
    completion: RequestCompletion<T>,
}

struct PendingTransaction<T: Transport> {
    request_opcode: u8,
    expected_response: Method,
    completion: RequestCompletion<T>,
}

/// The response PDU a request PDU expects, or `None` if `pdu` is not a request at all (a
/// command, notification, indication, confirmation, or response misused as a request).
fn expected_response_for(pdu: &Pdu) -> Option<Method> {
    Some(match pdu {
        Pdu::ExchangeMtuRequest { .. } => Method::ExchangeMtuResponse,
        Pdu::FindInformationRequest { .. } => Method::FindInformationResponse,
        Pdu::FindByTypeValueRequest { .. } => Method::FindByTypeValueResponse,
        Pdu::ReadByTypeRequest { .. } => Method::ReadByTypeResponse,
        Pdu::ReadRequest { .. } => Method::ReadResponse,
        Pdu::ReadBlobRequest { .. } => Method::ReadBlobResponse,
        Pdu::ReadMultipleRequest { .. } => Method::ReadMultipleResponse,
        Pdu::ReadByGroupTypeRequest { .. } => Method::ReadByGroupTypeResponse,
        Pdu::WriteRequest { .. } => Method::WriteResponse,
        Pdu::PrepareWriteRequest { .. } => Method::PrepareWriteResponse,
        Pdu::ExecuteWriteRequest { .. } => Method::ExecuteWriteResponse,
        _ => return None,
    })
}

pub struct Connection<T: Transport> {
    transport: T,
    effective_mtu: u16,
    pending: Option<PendingTransaction<T>>,
    queue: VecDeque<QueuedRequest<T>>,
    notification_handler: Option<NotificationHandler>,
    indication_handler: Option<IndicationHandler>,
    closed: bool,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Connection {
            transport,
            effective_mtu: MIN_ATT_MTU,
            pending: None,
            queue: VecDeque::new(),
            notification_handler: None,
            indication_handler: None,
            closed: false,
        }
    }

    pub fn mtu(&self) -> u16 {
        self.effective_mtu
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notification_handler = Some(handler);
    }

    pub fn set_indication_handler(&mut self, handler: IndicationHandler) {
        self.indication_handler = Some(handler);
    }

    /// Queue a request. If no response is currently pending it is written immediately;
    /// otherwise it waits in FIFO order behind whatever is already queued.
    pub fn send_request(&mut self, pdu: Pdu, completion: RequestCompletion<T>) {
        if self.closed {
            completion(Err(AttError::TransportClosed), self);
            return;
        }

        let expected_response = match expected_response_for(&pdu) {
            Some(method) => method,
            None => {
                log::warn!("(ATT) send_request called with a non-request PDU: {}", pdu.method());
                completion(Err(AttError::Malformed), self);
                return;
            }
        };

        self.queue.push_back(QueuedRequest { pdu, expected_response, completion });
        self.pump_send();
    }

    /// Send a command, notification, indication, or confirmation. These bypass the pairing rule
    /// entirely: there is no response to wait for.
    pub fn send_command(&mut self, pdu: Pdu) -> Result<(), AttError> {
        if self.closed {
            return Err(AttError::TransportClosed);
        }

        log::debug!("(ATT) sending {}", pdu.method());

        self.transport.write_message(&pdu.encode()).map_err(|e| {
            log::warn!("(ATT) transport write failed: {}", e);
            self.closed = true;
            AttError::TransportClosed
        })
    }

    /// Negotiate the effective MTU. Falls back to the default minimum if the peer does not
    /// support MTU exchange at all, logging that fallback once.
    pub fn exchange_mtu<F>(&mut self, client_rx_mtu: u16, completion: F)
    where
        F: FnOnce(Result<u16, AttError>, &mut Connection<T>) + 'static,
    {
        if client_rx_mtu < MIN_ATT_MTU {
            completion(Err(AttError::MtuTooSmall), self);
            return;
        }

        log::debug!("(ATT) requesting MTU exchange with client rx mtu {}", client_rx_mtu);

        self.send_request(
            Pdu::ExchangeMtuRequest { client_rx_mtu },
            Box::new(move |result, conn| match result {
                Ok(Pdu::ExchangeMtuResponse { server_rx_mtu }) => {
                    conn.effective_mtu = core::cmp::max(MIN_ATT_MTU, core::cmp::min(client_rx_mtu, server_rx_mtu));
                    log::debug!("(ATT) effective MTU negotiated to {}", conn.effective_mtu);
                    completion(Ok(conn.effective_mtu), conn);
                }
                Err(AttError::ErrorResponse { code: ErrorCode::RequestNotSupported, .. }) => {
                    log::info!("(ATT) peer does not support MTU exchange; using default MTU {}", MIN_ATT_MTU);
                    conn.effective_mtu = MIN_ATT_MTU;
                    completion(Ok(conn.effective_mtu), conn);
                }
                Err(e) => completion(Err(e), conn),
                Ok(other) => {
                    log::warn!("(ATT) unexpected response to MTU exchange: {}", other.method());
                    completion(Err(AttError::InvalidResponse), conn);
                }
            }),
        );
    }

    /// Pull and decode exactly one message from the transport and dispatch it. This is the only
    /// suspension point in the core: it blocks on the transport read.
    pub fn run_read(&mut self) -> Result<(), AttError> {
        if self.closed {
            return Err(AttError::TransportClosed);
        }

        match self.transport.read_message() {
            Ok(Some(bytes)) => {
                self.dispatch(&bytes);
                Ok(())
            }
            Ok(None) => {
                self.disconnect();
                Ok(())
            }
            Err(e) => {
                log::warn!("(ATT) transport read failed: {}", e);
                self.disconnect();
                Err(AttError::TransportClosed)
            }
        }
    }

    fn dispatch(&mut self, raw: &[u8]) {
        let pdu = match Pdu::decode(raw) {
            Ok(pdu) => pdu,
            Err(_) => {
                log::warn!("(ATT) discarding malformed PDU ({} bytes)", raw.len());
                return;
            }
        };

        log::trace!("(ATT) received {} ({} bytes)", pdu.method(), raw.len());

        match pdu {
            Pdu::ErrorResponse { request_opcode, handle, error_code } => {
                if self.pending.as_ref().map(|p| p.request_opcode) == Some(request_opcode) {
                    let pending = self.pending.take().unwrap();
                    log::debug!("(ATT) request {:#04x} failed: {}", request_opcode, error_code);
                    (pending.completion)(
                        Err(AttError::ErrorResponse { request_opcode, handle, code: error_code }),
                        self,
                    );
                    self.pump_send();
                } else {
                    log::warn!(
                        "(ATT) error response for opcode {:#04x} with no matching pending request",
                        request_opcode
                    );
                }
            }
            Pdu::HandleValueNotification { handle, value } => {
                log::debug!("(ATT) notification for handle {:#06x}", handle);
                if let Some(handler) = &mut self.notification_handler {
                    handler(handle, value);
                }
            }
            Pdu::HandleValueIndication { handle, value } => {
                log::debug!("(ATT) indication for handle {:#06x}", handle);
                if let Some(handler) = &mut self.indication_handler {
                    handler(handle, value);
                }
                if let Err(e) = self.transport.write_message(&Pdu::HandleValueConfirmation.encode()) {
                    log::warn!("(ATT) failed to send confirmation: {}", e);
                    self.closed = true;
                }
            }
            other => {
                if self.pending.as_ref().map(|p| p.expected_response) == Some(other.method()) {
                    let pending = self.pending.take().unwrap();
                    log::debug!("(ATT) completed pending request with {}", other.method());
                    (pending.completion)(Ok(other), self);
                    self.pump_send();
                } else {
                    log::warn!("(ATT) unexpected PDU {} with no matching pending request", other.method());
                }
            }
        }
    }

    fn pump_send(&mut self) {
        if self.closed || self.pending.is_some() {
            return;
        }

        if let Some(item) = self.queue.pop_front() {
            log::debug!("(ATT) sending {}", item.pdu.method());

            match self.transport.write_message(&item.pdu.encode()) {
                Ok(()) => {
                    self.pending = Some(PendingTransaction {
                        request_opcode: item.pdu.method().opcode_byte(),
                        expected_response: item.expected_response,
                        completion: item.completion,
                    });
                }
                Err(e) => {
                    log::warn!("(ATT) transport write failed: {}", e);
                    self.closed = true;
                    (item.completion)(Err(AttError::TransportClosed), self);
                    self.fail_queue();
                }
            }
        }
    }

    fn disconnect(&mut self) {
        self.closed = true;

        if let Some(pending) = self.pending.take() {
            (pending.completion)(Err(AttError::TransportClosed), self);
        }

        self.fail_queue();
    }

    fn fail_queue(&mut self) {
        while let Some(item) = self.queue.pop_front() {
            (item.completion)(Err(AttError::TransportClosed), self);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::PairedTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn pairing_rule_defers_second_request_until_first_completes() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let mut client = Connection::new(client_transport);

        let first_done = Rc::new(RefCell::new(false));
        let second_done = Rc::new(RefCell::new(false));

        {
            let first_done = first_done.clone();
            client.send_request(
                Pdu::ReadRequest { handle: 1 },
                Box::new(move |_, _| *first_done.borrow_mut() = true),
            );
        }
        {
            let second_done = second_done.clone();
            client.send_request(
                Pdu::ReadRequest { handle: 2 },
                Box::new(move |_, _| *second_done.borrow_mut() = true),
            );
        }

        // Only the first request should have reached the wire.
        let on_wire = server_transport.read_message().unwrap().unwrap();
        assert_eq!(Pdu::decode(&on_wire).unwrap(), Pdu::ReadRequest { handle: 1 });

        server_transport.write_message(&Pdu::ReadResponse { value: vec![0xAA] }.encode()).unwrap();
        client.run_read().unwrap();

        assert!(*first_done.borrow());
        assert!(!*second_done.borrow());

        let on_wire = server_transport.read_message().unwrap().unwrap();
        assert_eq!(Pdu::decode(&on_wire).unwrap(), Pdu::ReadRequest { handle: 2 });
    }

    #[test]
    fn mtu_exchange_clamps_to_minimum() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let mut client = Connection::new(client_transport);

        let negotiated = Rc::new(RefCell::new(None));
        {
            let negotiated = negotiated.clone();
            client.exchange_mtu(23, move |result, _| *negotiated.borrow_mut() = Some(result.unwrap()));
        }

        let on_wire = server_transport.read_message().unwrap().unwrap();
        assert_eq!(Pdu::decode(&on_wire).unwrap(), Pdu::ExchangeMtuRequest { client_rx_mtu: 23 });

        server_transport.write_message(&Pdu::ExchangeMtuResponse { server_rx_mtu: 184 }.encode()).unwrap();
        client.run_read().unwrap();

        assert_eq!(*negotiated.borrow(), Some(23));
        assert_eq!(client.mtu(), 23);
    }

    #[test]
    fn mtu_exchange_falls_back_when_not_supported() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let mut client = Connection::new(client_transport);

        client.exchange_mtu(100, |_, _| {});

        let on_wire = server_transport.read_message().unwrap().unwrap();
        let request_opcode = on_wire[0];
        server_transport
            .write_message(
                &Pdu::ErrorResponse { request_opcode, handle: 0, error_code: ErrorCode::RequestNotSupported }
                    .encode(),
            )
            .unwrap();
        client.run_read().unwrap();

        assert_eq!(client.mtu(), MIN_ATT_MTU);
    }

    #[test]
    fn indication_is_confirmed_before_next_request_is_sent() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let mut client = Connection::new(client_transport);
        client.set_indication_handler(Box::new(|_, _| {}));

        client.send_request(Pdu::ReadRequest { handle: 5 }, Box::new(|_, _| {}));
        // drain the request so the bearer looks idle from the server's point of view
        server_transport.read_message().unwrap();

        server_transport
            .write_message(&Pdu::HandleValueIndication { handle: 5, value: vec![0x41, 0x42] }.encode())
            .unwrap();
        client.run_read().unwrap();

        let on_wire = server_transport.read_message().unwrap().unwrap();
        assert_eq!(Pdu::decode(&on_wire).unwrap(), Pdu::HandleValueConfirmation);
    }

    #[test]
    fn disconnection_fails_pending_and_queued_requests_in_order() {
        let (client_transport, server_transport) = PairedTransport::pair();
        let mut client = Connection::new(client_transport);

        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let order = order.clone();
            client.send_request(
                Pdu::ReadRequest { handle: 1 },
                Box::new(move |r, _| order.borrow_mut().push((1, r.is_err()))),
            );
        }
        {
            let order = order.clone();
            client.send_request(
                Pdu::ReadRequest { handle: 2 },
                Box::new(move |r, _| order.borrow_mut().push((2, r.is_err()))),
            );
        }

        server_transport.close();
        client.run_read().unwrap();

        assert_eq!(*order.borrow(), vec![(1, true), (2, true)]);
        assert!(client.is_closed());
    }
}
