use dispute_watch::dispute::{DisputeContracts, DisputeError, DisputeExecutor};
use dispute_watch::evaluator::Threshold;
use dispute_watch::feeds::{MonitoredFeed, SourceError, SourceRegistry, TrustedValueSource};
use dispute_watch::onchain::abi::{
    ITellorOracle, ITellorToken, NEW_ORACLE_ADDRESS_TOPIC, NEW_PROPOSED_ORACLE_ADDRESS_TOPIC, NEW_REPORT_TOPIC,
};
use dispute_watch::onchain::blocks::BlockClock;
use dispute_watch::onchain::monitor::LogQuery;
use dispute_watch::onchain::{
    BlockLookupError, BoundUnit, LogPoller, LogSource, PollError, PollSettings, PollUnit, RawLogEvent, UnitKind,
};
use dispute_watch::pipeline::{
    Clocks, Monitor, MonitorEvent, ProcessorSettings, ReportProcessor, ReportRow, DISPUTABLE_ALERT,
    NEW_VALUE_ALERT, ORACLE_ADDRESS_ALERT,
};
use dispute_watch::pipeline::report::ALWAYS_ALERT_BANNER;
use dispute_watch::query::{encode_query, query_id, QueryKind, ReportValue};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const CHAIN: u64 = 1;
const ORACLE: Address = Address::new([0x0a; 20]);
const TOKEN: Address = Address::new([0x0b; 20]);

struct FakeChain {
    logs: HashMap<Address, Vec<RawLogEvent>>,
}

#[async_trait]
impl LogSource for FakeChain {
    async fn latest_block(&self) -> Result<u64, PollError> {
        Ok(100)
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLogEvent>, PollError> {
        Ok(self.logs.get(&query.address).cloned().unwrap_or_default())
    }
}

struct FixedPrice(f64);

#[async_trait]
impl TrustedValueSource for FixedPrice {
    fn describe(&self) -> String {
        format!("fixed {}", self.0)
    }

    async fn fetch(&self, _at_block: Option<u64>) -> Result<ReportValue, SourceError> {
        Ok(ReportValue::Numeric(self.0))
    }
}

struct NoClocks;

impl Clocks for NoClocks {
    fn clock_for(&self, _chain_id: u64) -> Option<Arc<dyn BlockClock>> {
        None
    }
}

#[derive(Default)]
struct RecordingContracts {
    writes: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl DisputeContracts for RecordingContracts {
    fn account(&self) -> Address {
        Address::repeat_byte(0xd1)
    }

    fn governance(&self) -> Address {
        Address::repeat_byte(0x60)
    }

    async fn dispute_fee(&self) -> Result<U256, DisputeError> {
        Ok(U256::from(10u64))
    }

    async fn vote_rounds(&self, _dispute_hash: B256) -> Result<Vec<U256>, DisputeError> {
        Ok(Vec::new())
    }

    async fn open_disputes_on_id(&self, _query_id: B256) -> Result<U256, DisputeError> {
        Ok(U256::ZERO)
    }

    async fn stake_amount(&self) -> Result<U256, DisputeError> {
        Ok(U256::from(100u64))
    }

    async fn token_balance(&self, _account: Address) -> Result<U256, DisputeError> {
        Ok(U256::from(1_000u64))
    }

    async fn approve(&self, _spender: Address, _amount: U256) -> Result<B256, DisputeError> {
        self.writes.lock().unwrap().push("approve");
        Ok(B256::repeat_byte(0xa1))
    }

    async fn begin_dispute(&self, _query_id: B256, _timestamp: u64) -> Result<B256, DisputeError> {
        self.writes.lock().unwrap().push("beginDispute");
        Ok(B256::repeat_byte(0xd5))
    }
}

fn eth_usd() -> (Bytes, B256) {
    let kind = QueryKind::SpotPrice {
        asset: "eth".into(),
        currency: "usd".into(),
    };
    let data = encode_query(&kind).unwrap();
    let id = query_id(&kind, &data);
    (data, id)
}

fn word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

fn price(units: u64) -> Bytes {
    word(U256::from(units) * U256::from(10u64).pow(U256::from(18u64)))
}

fn report_log(tx: u8, query_data: Bytes, id: B256, value: Bytes) -> RawLogEvent {
    let log = ITellorOracle::NewReport {
        _queryId: id,
        _time: U256::from(1_700_000_000u64),
        _value: value,
        _nonce: U256::from(1u64),
        _queryData: query_data,
        _reporter: Address::repeat_byte(0xee),
    }
    .encode_log_data();
    assert_eq!(log.topics()[0], NEW_REPORT_TOPIC);
    RawLogEvent {
        chain_id: CHAIN,
        address: ORACLE,
        topics: log.topics().to_vec(),
        data: log.data.clone(),
        block_number: 95,
        tx_hash: B256::repeat_byte(tx),
        log_index: 0,
    }
}

fn oracle_change_log(tx: u8) -> RawLogEvent {
    let log = ITellorToken::NewOracleAddress {
        _newOracle: Address::repeat_byte(0x99),
        _timestamp: U256::from(1_700_000_000u64),
    }
    .encode_log_data();
    RawLogEvent {
        chain_id: CHAIN,
        address: TOKEN,
        topics: log.topics().to_vec(),
        data: log.data.clone(),
        block_number: 96,
        tx_hash: B256::repeat_byte(tx),
        log_index: 0,
    }
}

fn chain_logs() -> FakeChain {
    let (eth_data, eth_id) = eth_usd();

    let oracle_kind = QueryKind::Custom {
        type_name: "TellorOracleAddress".into(),
        params: vec![("V".into(), DynSolValue::Bytes(vec![0x01]))],
    };
    let oracle_data = encode_query(&oracle_kind).unwrap();
    let oracle_id = query_id(&oracle_kind, &oracle_data);
    let mut address_word = [0u8; 32];
    address_word[12..].copy_from_slice(Address::repeat_byte(0x99).as_slice());

    let string_kind = QueryKind::Custom {
        type_name: "StringQuery".into(),
        params: vec![("text".into(), DynSolValue::String("who won?".into()))],
    };
    let string_data = encode_query(&string_kind).unwrap();
    let string_id = query_id(&string_kind, &string_data);

    let reports = vec![
        report_log(0x01, eth_data.clone(), eth_id, price(750)),
        report_log(0x02, eth_data, eth_id, price(900)),
        report_log(0x03, oracle_data, oracle_id, Bytes::from(address_word.to_vec())),
        report_log(0x04, string_data, string_id, Bytes::from(vec![0u8; 64])),
    ];

    FakeChain {
        logs: HashMap::from([(ORACLE, reports), (TOKEN, vec![oracle_change_log(0x05)])]),
    }
}

fn monitor(
    see_all_values: bool,
    executor: DisputeExecutor,
) -> (Monitor, mpsc::UnboundedReceiver<MonitorEvent>, Vec<MonitoredFeed>) {
    let source: Arc<dyn LogSource> = Arc::new(chain_logs());
    let units = vec![
        BoundUnit {
            unit: PollUnit {
                chain_id: CHAIN,
                rpc_url: "http://localhost:8545".into(),
                address: ORACLE,
                topics: vec![NEW_REPORT_TOPIC],
                kind: UnitKind::Reports,
            },
            source: source.clone(),
        },
        BoundUnit {
            unit: PollUnit {
                chain_id: CHAIN,
                rpc_url: "http://localhost:8545".into(),
                address: TOKEN,
                topics: vec![NEW_ORACLE_ADDRESS_TOPIC, NEW_PROPOSED_ORACLE_ADDRESS_TOPIC],
                kind: UnitKind::OracleAddress,
            },
            source,
        },
    ];

    let registry = Arc::new(SourceRegistry::new(HashMap::new(), Duration::from_secs(1)).unwrap());
    let processor = ReportProcessor::new(
        registry,
        Arc::new(NoClocks),
        HashMap::from([(CHAIN, "https://etherscan.io".to_string())]),
        ProcessorSettings {
            confidence_threshold: 0.1,
            see_all_values,
        },
    );

    let feeds = vec![MonitoredFeed {
        query_id: Some(eth_usd().1),
        query_type: "SpotPrice".into(),
        source: Some(Arc::new(FixedPrice(1000.0))),
        threshold: Threshold::percentage(0.25).unwrap(),
    }];

    let (tx, rx) = mpsc::unbounded_channel();
    let monitor = Monitor::new(
        LogPoller::new(PollSettings::default()),
        units,
        Some(Duration::from_secs(5)),
        64,
        processor,
        executor,
        tx,
    );
    (monitor, rx, feeds)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn alerts(events: &[MonitorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Alert { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[MonitorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Row(row) => Some(row.status.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_cycle_alerts_rows_and_dedup() {
    let (mut monitor, mut rx, feeds) = monitor(false, DisputeExecutor::disabled());

    let stats = monitor.run_cycle(&feeds).await;
    assert_eq!(stats.events, 5);
    assert_eq!(stats.duplicates, 0);
    assert_eq!(stats.reports, 3);
    assert_eq!(stats.alerts, 3);
    assert_eq!(stats.disputes, 0);

    let events = drain(&mut rx);
    let alerts = alerts(&events);
    let link = format!("https://etherscan.io/tx/{}", B256::repeat_byte(0x01));
    assert!(alerts.contains(&format!("{DISPUTABLE_ALERT}\n{link}")));
    assert!(alerts.iter().any(|a| a.starts_with(ALWAYS_ALERT_BANNER)));
    assert!(alerts.iter().any(|a| a.starts_with(ORACLE_ADDRESS_ALERT)));
    assert!(!alerts.iter().any(|a| a.starts_with(NEW_VALUE_ALERT)));

    assert_eq!(statuses(&events), vec!["yes ❗", "no ✔", ALWAYS_ALERT_BANNER]);

    // The next poll re-scans the same blocks; nothing is reported twice.
    let stats = monitor.run_cycle(&feeds).await;
    assert_eq!(stats.events, 5);
    assert_eq!(stats.duplicates, 5);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_all_values_alerts_every_report() {
    let (mut monitor, mut rx, feeds) = monitor(true, DisputeExecutor::disabled());
    monitor.run_cycle(&feeds).await;

    let alerts = alerts(&drain(&mut rx));
    let new_value = format!("{NEW_VALUE_ALERT}\nhttps://etherscan.io/tx/{}", B256::repeat_byte(0x02));
    assert!(alerts.contains(&new_value));
}

#[tokio::test]
async fn test_disputable_report_on_monitored_feed_is_disputed() {
    let contracts = Arc::new(RecordingContracts::default());
    let executor = DisputeExecutor::new(
        true,
        CHAIN,
        Some(contracts.clone()),
        2,
        Some("https://etherscan.io".into()),
    );
    let (mut monitor, mut rx, feeds) = monitor(false, executor);

    let stats = monitor.run_cycle(&feeds).await;
    assert_eq!(stats.disputes, 1);
    assert_eq!(*contracts.writes.lock().unwrap(), vec!["approve", "beginDispute"]);

    let events = drain(&mut rx);
    let disputed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Disputed { query_id, tx_hash, .. } => Some((*query_id, *tx_hash)),
            _ => None,
        })
        .collect();
    assert_eq!(disputed, vec![(eth_usd().1, B256::repeat_byte(0xd5))]);
    assert_eq!(statuses(&events)[0], "yes ❗ ⚔ disputed");
}

const CALL_CHAIN: u64 = 137;
const GENESIS: u64 = 1_600_000_000;

/// Block `n` was mined at `GENESIS + 12 * n`.
struct LinearChain;

#[async_trait]
impl BlockClock for LinearChain {
    async fn latest_block(&self) -> Result<u64, BlockLookupError> {
        Ok(10_000)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, BlockLookupError> {
        Ok(GENESIS + number * 12)
    }
}

#[derive(Default)]
struct CallClocks {
    asked: Mutex<Vec<u64>>,
}

impl Clocks for CallClocks {
    fn clock_for(&self, chain_id: u64) -> Option<Arc<dyn BlockClock>> {
        self.asked.lock().unwrap().push(chain_id);
        (chain_id == CALL_CHAIN).then(|| Arc::new(LinearChain) as Arc<dyn BlockClock>)
    }
}

struct CallResult {
    data: Bytes,
    blocks: Mutex<Vec<Option<u64>>>,
}

#[async_trait]
impl TrustedValueSource for CallResult {
    fn describe(&self) -> String {
        "call result".to_string()
    }

    async fn fetch(&self, at_block: Option<u64>) -> Result<ReportValue, SourceError> {
        self.blocks.lock().unwrap().push(at_block);
        Ok(ReportValue::Bytes(self.data.clone()))
    }
}

fn processor(clocks: Arc<dyn Clocks>, see_all_values: bool) -> ReportProcessor {
    let registry = Arc::new(SourceRegistry::new(HashMap::new(), Duration::from_secs(1)).unwrap());
    ReportProcessor::new(
        registry,
        clocks,
        HashMap::new(),
        ProcessorSettings {
            confidence_threshold: 0.1,
            see_all_values,
        },
    )
}

#[tokio::test]
async fn test_call_report_checked_at_its_block() {
    let kind = QueryKind::EvmCall {
        chain_id: CALL_CHAIN,
        contract: Address::repeat_byte(0x11),
        calldata: Bytes::from_static(&[0x18, 0x16, 0x0d, 0xdd]),
    };
    let data = encode_query(&kind).unwrap();
    let id = query_id(&kind, &data);
    let value = DynSolValue::Tuple(vec![
        DynSolValue::Bytes(vec![0x30, 0x39]),
        DynSolValue::Uint(U256::from(GENESIS + 500 * 12), 256),
    ])
    .abi_encode_params();
    let event = report_log(0x06, data, id, Bytes::from(value));

    let source = Arc::new(CallResult {
        data: Bytes::from_static(&[0x30, 0x39]),
        blocks: Mutex::new(Vec::new()),
    });
    let trusted: Arc<dyn TrustedValueSource> = source.clone();
    let feeds = vec![MonitoredFeed {
        query_id: Some(id),
        query_type: "EVMCall".into(),
        source: Some(trusted),
        threshold: Threshold::equality(),
    }];

    let clocks = Arc::new(CallClocks::default());
    let processed = processor(clocks.clone(), false)
        .process(&event, &feeds)
        .await
        .unwrap();

    assert_eq!(processed.report.query_type, "EVMCall");
    assert_eq!(processed.report.disputable, Some(false));
    assert_eq!(*clocks.asked.lock().unwrap(), vec![CALL_CHAIN]);
    assert_eq!(*source.blocks.lock().unwrap(), vec![Some(500)]);
}

#[tokio::test]
async fn test_short_value_keeps_warning_on_row() {
    let (data, id) = eth_usd();
    let event = report_log(0x07, data, id, Bytes::from_static(&[0xde, 0xad]));
    let feeds = vec![MonitoredFeed {
        query_id: Some(id),
        query_type: "SpotPrice".into(),
        source: Some(Arc::new(FixedPrice(1000.0))),
        threshold: Threshold::percentage(0.25).unwrap(),
    }];

    let processed = processor(Arc::new(NoClocks), true)
        .process(&event, &feeds)
        .await
        .unwrap();

    assert_eq!(processed.report.value, Some(ReportValue::Bytes(Bytes::from_static(&[0xde, 0xad]))));
    assert_eq!(processed.report.disputable, None);
    let row = ReportRow::from(&processed.report);
    assert!(row.warning.unwrap().contains("length 2"));
}
