//! Incoming frame classification and decoding.
//!
//! Every inbound text frame is either a control frame (acknowledgement or
//! error, carrying `httpCode`) or a data frame whose `data` payload is
//! shaped by the opcode of the subscription that produced it.

use tracing::{debug, warn};

use crate::Result;
use crate::error::{AlorError, ApiError};
use crate::models::{
    Candle, Opcode, Order, OrderBook, Quote, StreamFrame, SubscriptionRequest,
};

/// Outcome of routing one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Acknowledgement or empty frame, nothing to deliver.
    Ack,
    /// The server refused the subscription; the session must close.
    Rejected(ApiError),
    Candle(Candle),
    Quote(Quote),
    Order(Order),
    OrderBook(OrderBook),
    /// Data for a feed without a decoder.
    Unsupported(Opcode),
}

/// Parses the envelope of a text frame.
///
/// # Errors
///
/// Returns [`AlorError::MalformedMessage`] if the text is not a JSON
/// object of the expected shape.
pub fn parse_frame(text: &str) -> Result<StreamFrame> {
    serde_json::from_str(text).map_err(|e| AlorError::MalformedMessage(e.to_string()))
}

/// Classifies a frame and decodes its payload for `request`'s feed.
///
/// # Errors
///
/// Returns [`AlorError::MalformedMessage`] if the payload does not match
/// the feed's record type. The caller drops the frame and keeps reading.
pub fn route(frame: StreamFrame, request: &SubscriptionRequest) -> Result<Routed> {
    if let Some(status) = frame.http_code {
        if status >= 400 {
            return Ok(Routed::Rejected(ApiError {
                status,
                message: frame.message.unwrap_or_default(),
                request_guid: frame.request_guid,
            }));
        }
        debug!(
            guid = request.guid(),
            status,
            message = frame.message.as_deref().unwrap_or(""),
            "Subscription acknowledged"
        );
        return Ok(Routed::Ack);
    }

    let Some(data) = frame.data else {
        return Ok(Routed::Ack);
    };

    if let Some(guid) = frame.guid.as_deref() {
        if guid != request.guid() {
            warn!(expected = request.guid(), received = guid, "Frame guid mismatch");
        }
    }

    let routed = match request.opcode {
        Opcode::Bars => {
            let mut candle: Candle = decode(data)?;
            candle.symbol = request.code.clone().unwrap_or_default();
            candle.interval = request.tf;
            Routed::Candle(candle)
        }
        Opcode::Quotes => Routed::Quote(decode(data)?),
        Opcode::Orders => Routed::Order(decode(data)?),
        Opcode::OrderBook => {
            let mut book: OrderBook = decode(data)?;
            book.symbol = request.code.clone().unwrap_or_default();
            Routed::OrderBook(book)
        }
        Opcode::AllTrades
        | Opcode::Positions
        | Opcode::Summaries
        | Opcode::Risks
        | Opcode::Trades
        | Opcode::StopOrders
        | Opcode::Instruments => Routed::Unsupported(request.opcode),
    };

    Ok(routed)
}

fn decode<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| AlorError::MalformedMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{Interval, OrderSide};

    fn candles() -> SubscriptionRequest {
        SubscriptionRequest::candles("MOEX", "SBER", Interval::M1)
    }

    fn route_text(text: &str, request: &SubscriptionRequest) -> Result<Routed> {
        route(parse_frame(text)?, request)
    }

    #[test]
    fn error_code_rejects_the_session() {
        let routed = route_text(
            r#"{"message":"Invalid token","httpCode":401,"requestGuid":"candle|SBER|60"}"#,
            &candles(),
        )
        .unwrap();

        let Routed::Rejected(err) = routed else {
            panic!("expected rejection, got {routed:?}");
        };
        assert_eq!(err.status, 401);
        assert_eq!(err.message, "Invalid token");
        assert_eq!(err.request_guid.as_deref(), Some("candle|SBER|60"));
    }

    #[test]
    fn success_code_is_an_acknowledgement() {
        let routed = route_text(
            r#"{"message":"Handled successfully","httpCode":200,"requestGuid":"candle|SBER|60"}"#,
            &candles(),
        )
        .unwrap();
        assert_eq!(routed, Routed::Ack);
    }

    #[test]
    fn frame_without_code_or_data_is_ignored() {
        assert_eq!(route_text("{}", &candles()).unwrap(), Routed::Ack);
    }

    #[test]
    fn candle_data_is_stamped_with_symbol_and_interval() {
        let routed = route_text(
            r#"{"data":{"time":1717063200,"close":30.51,"open":30.4,"high":30.6,"low":30.38,"volume":1523},"guid":"candle|SBER|60"}"#,
            &candles(),
        )
        .unwrap();

        let Routed::Candle(candle) = routed else {
            panic!("expected candle, got {routed:?}");
        };
        assert_eq!(candle.symbol, "SBER");
        assert_eq!(candle.interval, Some(Interval::M1));
        assert_eq!(candle.close, dec!(30.51));
    }

    #[test]
    fn quote_and_order_data_decode_by_opcode() {
        let quote = route_text(
            r#"{"data":{"symbol":"SBER","exchange":"MOEX","last_price":315.5,"bid":315.4,"ask":315.6},"guid":"quote|SBER"}"#,
            &SubscriptionRequest::quotes("MOEX", "SBER"),
        )
        .unwrap();
        let Routed::Quote(quote) = quote else {
            panic!("expected quote");
        };
        assert_eq!(quote.spread(), Some(dec!(0.2)));

        let order = route_text(
            r#"{"data":{"id":"1","symbol":"SBER","type":"limit","side":"sell","status":"working","qty":1,"price":316},"guid":"orders|D39004"}"#,
            &SubscriptionRequest::orders("MOEX", "D39004"),
        )
        .unwrap();
        let Routed::Order(order) = order else {
            panic!("expected order");
        };
        assert_eq!(order.side, OrderSide::Sell);
    }

    #[test]
    fn order_book_is_stamped_with_symbol() {
        let routed = route_text(
            r#"{"data":{"bids":[{"price":1.5,"volume":3}],"asks":[],"ms_timestamp":1,"existing":true},"guid":"orderbook|GAZP"}"#,
            &SubscriptionRequest::order_book("MOEX", "GAZP"),
        )
        .unwrap();
        let Routed::OrderBook(book) = routed else {
            panic!("expected order book");
        };
        assert_eq!(book.symbol, "GAZP");
        assert_eq!(book.best_bid().unwrap().volume, 3);
    }

    #[test]
    fn feed_without_decoder_is_unsupported() {
        let request = SubscriptionRequest::new(
            Opcode::AllTrades,
            "MOEX",
            Some("SBER".into()),
            None,
            None,
        );
        let routed = route_text(r#"{"data":{"id":1},"guid":"alltrades|SBER"}"#, &request).unwrap();
        assert_eq!(routed, Routed::Unsupported(Opcode::AllTrades));
    }

    #[test]
    fn bad_payload_is_a_malformed_message() {
        let err = route_text(r#"{"data":{"time":"yesterday"}}"#, &candles()).unwrap_err();
        assert!(matches!(err, AlorError::MalformedMessage(_)));

        let err = parse_frame("not json").unwrap_err();
        assert!(matches!(err, AlorError::MalformedMessage(_)));
    }
}
