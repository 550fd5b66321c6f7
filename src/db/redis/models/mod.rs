pub mod trade_record;
