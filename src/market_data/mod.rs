// Market data module entrypoint
pub mod adapters;     // venue-specific decoders (binance, huobi)
pub mod connector;    // websocket session + reconnect loop
pub mod heartbeat;    // inbound idle watchdog
pub mod market_state; // latest quote per venue
pub mod normaliser;   // wire strings -> Decimal prices
pub mod router;       // wires connectors into detection
pub mod types;
