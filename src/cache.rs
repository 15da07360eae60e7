//! The shared record store, keyed by `(name, type, class, family,
//! ifindex)`.
//!
//! Realized as a single-owner actor task reached through [`CacheHandle`]:
//! one task serializing `lookup`/`ingest`/`withdraw_interface` requests
//! over a channel preserves the single-writer invariant and keeps
//! cache-flush/goodbye ordering trivial, without read-write lock
//! contention on the hot datagram path.
//!
//! Eviction is bounded by two priority queues tracking
//! least-recently-used and soonest-to-expire keys, keyed on the full
//! five-part `CacheKey` rather than a bare name.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use priority_queue::PriorityQueue;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::wire::{ClassCode, Message, Question, ResourceRecord, TypeCode};

/// Address family a record or interface was observed on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Family {
    Inet,
    Inet6,
}

/// The cache's key: records learned on one interface/family never
/// satisfy a lookup scoped to another.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub type_code: TypeCode,
    pub class: ClassCode,
    pub family: Family,
    pub ifindex: u32,
}

impl CacheKey {
    fn new(name: &str, type_code: TypeCode, class: ClassCode, family: Family, ifindex: u32) -> Self {
        CacheKey {
            name: name.to_lowercase(),
            type_code,
            class,
            family,
            ifindex,
        }
    }
}

/// Record types the cache understands; everything else is dropped
/// silently on ingestion.
fn is_cacheable(type_code: TypeCode) -> bool {
    matches!(
        type_code,
        TypeCode::A
            | TypeCode::AAAA
            | TypeCode::CNAME
            | TypeCode::PTR
            | TypeCode::SRV
            | TypeCode::TXT
            | TypeCode::NSEC
    )
}

/// One learned `(rdata, ttl, expiry)` tuple plus the bookkeeping the
/// cache needs to answer a lookup.
#[derive(Debug, Clone)]
struct CachedRecord {
    record: ResourceRecord,
    expires_at: Instant,
}

/// All records currently held under one [`CacheKey`].
struct Bucket {
    last_read: Instant,
    records: Vec<CachedRecord>,
}

impl Bucket {
    fn next_expiry(&self) -> Option<Instant> {
        self.records.iter().map(|r| r.expires_at).min()
    }
}

/// The record store itself. Not `Send`-shared; owned exclusively by
/// the actor task spawned in [`spawn`].
struct Cache {
    entries: HashMap<CacheKey, Bucket>,
    access_priority: PriorityQueue<CacheKey, Reverse<Instant>>,
    expiry_priority: PriorityQueue<CacheKey, Reverse<Instant>>,
    current_size: usize,
    desired_size: usize,
}

impl Cache {
    fn new(desired_size: usize) -> Self {
        Cache {
            entries: HashMap::new(),
            access_priority: PriorityQueue::new(),
            expiry_priority: PriorityQueue::new(),
            current_size: 0,
            desired_size,
        }
    }

    fn ingest(&mut self, message: &Message, family: Family, ifindex: u32, now: Instant) {
        for rr in message
            .answers
            .iter()
            .chain(message.authority.iter())
            .chain(message.additional.iter())
        {
            self.ingest_one(rr, family, ifindex, now);
        }
    }

    fn ingest_one(&mut self, rr: &ResourceRecord, family: Family, ifindex: u32, now: Instant) {
        let type_code = rr.rtype();
        if !is_cacheable(type_code) {
            return;
        }
        let key = CacheKey::new(&rr.name, type_code, rr.rclass, family, ifindex);

        if rr.cache_flush {
            self.drop_key(&key);
        }

        if rr.ttl == 0 {
            self.remove_rdata(&key, rr);
            return;
        }

        self.upsert(key, rr.clone(), now);
    }

    fn upsert(&mut self, key: CacheKey, rr: ResourceRecord, now: Instant) {
        let expires_at = now + Duration::from_secs(u64::from(rr.ttl));
        let entry = self.entries.entry(key.clone()).or_insert_with(|| Bucket {
            last_read: now,
            records: Vec::new(),
        });

        if let Some(existing) = entry.records.iter_mut().find(|r| r.record.rdata == rr.rdata) {
            existing.record = rr;
            existing.expires_at = expires_at;
        } else {
            entry.records.push(CachedRecord {
                record: rr,
                expires_at,
            });
            self.current_size += 1;
        }

        self.touch_priorities(&key, now);
        self.prune(now);
    }

    fn remove_rdata(&mut self, key: &CacheKey, rr: &ResourceRecord) {
        let Some(bucket) = self.entries.get_mut(key) else {
            return;
        };
        let before = bucket.records.len();
        bucket.records.retain(|r| r.record.rdata != rr.rdata);
        self.current_size -= before - bucket.records.len();
        if bucket.records.is_empty() {
            self.entries.remove(key);
            self.access_priority.remove(key);
            self.expiry_priority.remove(key);
        } else if let Some(next_expiry) = bucket.next_expiry() {
            self.expiry_priority.push(key.clone(), Reverse(next_expiry));
        }
    }

    fn drop_key(&mut self, key: &CacheKey) {
        if let Some(bucket) = self.entries.remove(key) {
            self.current_size -= bucket.records.len();
        }
        self.access_priority.remove(key);
        self.expiry_priority.remove(key);
    }

    fn touch_priorities(&mut self, key: &CacheKey, now: Instant) {
        self.access_priority.push(key.clone(), Reverse(now));
        if let Some(bucket) = self.entries.get(key) {
            if let Some(next_expiry) = bucket.next_expiry() {
                self.expiry_priority.push(key.clone(), Reverse(next_expiry));
            }
        }
    }

    /// A record is fresh only in the first half of its TTL: the mDNS
    /// known-answer suppression rule.
    fn is_fresh(record: &CachedRecord, now: Instant) -> bool {
        if record.expires_at <= now {
            return false;
        }
        let remaining = record.expires_at.duration_since(now);
        remaining.as_secs() > u64::from(record.record.ttl) / 2
    }

    fn lookup(&mut self, questions: &[Question], family: Family, ifindex: u32, now: Instant) -> Vec<ResourceRecord> {
        let mut visited: HashSet<(String, TypeCode, ClassCode)> = HashSet::new();
        let mut worklist: VecDeque<(String, TypeCode, ClassCode)> = questions
            .iter()
            .map(|q| (q.name.to_lowercase(), q.qtype, q.qclass))
            .collect();
        let mut results = Vec::new();

        while let Some((name, type_code, class)) = worklist.pop_front() {
            if !visited.insert((name.clone(), type_code, class)) {
                continue;
            }

            let matched = self.matching_fresh(&name, type_code, class, family, ifindex, now);
            for rr in &matched {
                match &rr.rdata {
                    crate::wire::Rdata::PTR { name: target } => {
                        worklist.push_back((target.to_lowercase(), TypeCode::SRV, class));
                    }
                    crate::wire::Rdata::SRV { target, .. } => {
                        worklist.push_back((name.clone(), TypeCode::TXT, class));
                        worklist.push_back((target.to_lowercase(), TypeCode::A, class));
                        worklist.push_back((target.to_lowercase(), TypeCode::AAAA, class));
                    }
                    _ => {}
                }
            }
            results.extend(matched);
        }

        results
    }

    fn matching_fresh(
        &mut self,
        name: &str,
        type_code: TypeCode,
        class: ClassCode,
        family: Family,
        ifindex: u32,
        now: Instant,
    ) -> Vec<ResourceRecord> {
        let type_codes: Vec<TypeCode> = if type_code == TypeCode::ANY {
            vec![
                TypeCode::A,
                TypeCode::AAAA,
                TypeCode::CNAME,
                TypeCode::PTR,
                TypeCode::SRV,
                TypeCode::TXT,
                TypeCode::NSEC,
            ]
        } else {
            vec![type_code]
        };

        let mut out = Vec::new();
        for tc in type_codes {
            let key = CacheKey::new(name, tc, class, family, ifindex);
            if let Some(bucket) = self.entries.get_mut(&key) {
                bucket.last_read = now;
                out.extend(
                    bucket
                        .records
                        .iter()
                        .filter(|r| Self::is_fresh(r, now))
                        .map(|r| r.record.clone()),
                );
                self.access_priority.push(key, Reverse(now));
            }
        }
        out
    }

    fn withdraw_interface(&mut self, family: Family, ifindex: u32) {
        let keys: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| k.family == family && k.ifindex == ifindex)
            .cloned()
            .collect();
        for key in keys {
            self.drop_key(&key);
        }
    }

    fn prune(&mut self, now: Instant) {
        while self.current_size > self.desired_size {
            if !self.remove_one_expired(now) && !self.remove_least_recently_used() {
                break;
            }
        }
    }

    fn remove_one_expired(&mut self, now: Instant) -> bool {
        if let Some((key, Reverse(expiry))) = self.expiry_priority.peek() {
            if *expiry <= now {
                let key = key.clone();
                self.expiry_priority.pop();
                self.drop_key(&key);
                return true;
            }
        }
        false
    }

    fn remove_least_recently_used(&mut self) -> bool {
        if let Some((key, _)) = self.access_priority.pop() {
            self.drop_key(&key);
            true
        } else {
            false
        }
    }
}

/// A request sent to the cache actor task.
enum Request {
    Lookup {
        questions: Vec<Question>,
        family: Family,
        ifindex: u32,
        reply: oneshot::Sender<Vec<ResourceRecord>>,
    },
    Ingest {
        message: Message,
        family: Family,
        ifindex: u32,
    },
    WithdrawInterface {
        family: Family,
        ifindex: u32,
    },
}

/// A cloneable reference to the cache actor task.
#[derive(Clone)]
pub struct CacheHandle {
    sender: mpsc::Sender<Request>,
}

impl CacheHandle {
    /// Return currently-fresh records matching `questions`, expanded
    /// through PTR -> SRV -> (TXT, A/AAAA) related-question chasing.
    pub async fn lookup(
        &self,
        questions: Vec<Question>,
        family: Family,
        ifindex: u32,
    ) -> Vec<ResourceRecord> {
        let (reply, rx) = oneshot::channel();
        if self
            .sender
            .send(Request::Lookup {
                questions,
                family,
                ifindex,
                reply,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Ingest every cacheable record in `message`'s answer, authority,
    /// and additional sections.
    pub async fn ingest(&self, message: Message, family: Family, ifindex: u32) {
        let _ = self
            .sender
            .send(Request::Ingest {
                message,
                family,
                ifindex,
            })
            .await;
    }

    /// Drop every cache key scoped to `(family, ifindex)`, in response
    /// to a `link_down`/`del_addr` interface event.
    pub async fn withdraw_interface(&self, family: Family, ifindex: u32) {
        let _ = self
            .sender
            .send(Request::WithdrawInterface { family, ifindex })
            .await;
    }
}

/// Spawn the cache actor task and return a handle to it.
pub fn spawn(desired_size: usize) -> CacheHandle {
    let (sender, mut receiver) = mpsc::channel(256);
    tokio::spawn(async move {
        let mut cache = Cache::new(desired_size);
        while let Some(request) = receiver.recv().await {
            let now = Instant::now();
            match request {
                Request::Lookup {
                    questions,
                    family,
                    ifindex,
                    reply,
                } => {
                    let records = cache.lookup(&questions, family, ifindex, now);
                    trace!(count = records.len(), "cache lookup");
                    let _ = reply.send(records);
                }
                Request::Ingest {
                    message,
                    family,
                    ifindex,
                } => {
                    debug!(
                        answers = message.answers.len(),
                        authority = message.authority.len(),
                        additional = message.additional.len(),
                        "cache ingest"
                    );
                    cache.ingest(&message, family, ifindex, now);
                }
                Request::WithdrawInterface { family, ifindex } => {
                    debug!(?family, ifindex, "cache withdraw interface");
                    cache.withdraw_interface(family, ifindex);
                }
            }
        }
    });
    CacheHandle { sender }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Rdata;

    fn a_record(name: &str, ttl: u32, address: (u8, u8, u8, u8)) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            rclass: ClassCode::IN,
            cache_flush: false,
            ttl,
            rdata: Rdata::A { address },
        }
    }

    fn question(name: &str, qtype: TypeCode) -> Question {
        Question {
            name: name.to_string(),
            qtype,
            qclass: ClassCode::IN,
            unicast_response: false,
        }
    }

    #[test]
    fn insert_then_lookup_within_half_ttl() {
        let mut cache = Cache::new(512);
        let now = Instant::now();
        let rr = a_record("host.local", 100, (10, 0, 0, 1));
        cache.upsert(
            CacheKey::new("host.local", TypeCode::A, ClassCode::IN, Family::Inet, 1),
            rr.clone(),
            now,
        );

        let found = cache.lookup(&[question("host.local", TypeCode::A)], Family::Inet, 1, now);
        assert_eq!(found, vec![rr]);
    }

    #[test]
    fn lookup_excludes_records_past_half_ttl() {
        let mut cache = Cache::new(512);
        let now = Instant::now();
        let rr = a_record("host.local", 100, (10, 0, 0, 1));
        cache.upsert(
            CacheKey::new("host.local", TypeCode::A, ClassCode::IN, Family::Inet, 1),
            rr,
            now,
        );

        let later = now + Duration::from_secs(51);
        let found = cache.lookup(&[question("host.local", TypeCode::A)], Family::Inet, 1, later);
        assert!(found.is_empty());
    }

    #[test]
    fn cache_flush_drops_earlier_rdata_but_not_other_keys() {
        let mut cache = Cache::new(512);
        let now = Instant::now();
        let key = CacheKey::new("host.local", TypeCode::A, ClassCode::IN, Family::Inet, 1);
        cache.upsert(key.clone(), a_record("host.local", 100, (10, 0, 0, 1)), now);

        let other_key = CacheKey::new("other.local", TypeCode::A, ClassCode::IN, Family::Inet, 1);
        cache.upsert(other_key, a_record("other.local", 100, (10, 0, 0, 2)), now);

        let mut flush_rr = a_record("host.local", 100, (10, 0, 0, 9));
        flush_rr.cache_flush = true;
        cache.ingest_one(&flush_rr, Family::Inet, 1, now);

        let found = cache.lookup(&[question("host.local", TypeCode::A)], Family::Inet, 1, now);
        assert_eq!(found, vec![flush_rr]);

        let other_found = cache.lookup(&[question("other.local", TypeCode::A)], Family::Inet, 1, now);
        assert_eq!(other_found.len(), 1);
    }

    #[test]
    fn goodbye_record_removes_only_matching_rdata() {
        let mut cache = Cache::new(512);
        let now = Instant::now();
        let key = CacheKey::new("host.local", TypeCode::A, ClassCode::IN, Family::Inet, 1);
        cache.upsert(key.clone(), a_record("host.local", 100, (10, 0, 0, 1)), now);
        cache.upsert(key, a_record("host.local", 100, (10, 0, 0, 2)), now);

        let mut goodbye = a_record("host.local", 0, (10, 0, 0, 1));
        goodbye.ttl = 0;
        cache.ingest_one(&goodbye, Family::Inet, 1, now);

        let found = cache.lookup(&[question("host.local", TypeCode::A)], Family::Inet, 1, now);
        assert_eq!(found, vec![a_record("host.local", 100, (10, 0, 0, 2))]);
    }

    #[test]
    fn withdraw_interface_drops_all_keys_for_that_scope() {
        let mut cache = Cache::new(512);
        let now = Instant::now();
        cache.upsert(
            CacheKey::new("host.local", TypeCode::A, ClassCode::IN, Family::Inet, 1),
            a_record("host.local", 100, (10, 0, 0, 1)),
            now,
        );
        cache.withdraw_interface(Family::Inet, 1);

        let found = cache.lookup(&[question("host.local", TypeCode::A)], Family::Inet, 1, now);
        assert!(found.is_empty());
    }

    #[test]
    fn ptr_lookup_expands_to_srv_txt_and_address_records() {
        let mut cache = Cache::new(512);
        let now = Instant::now();
        let family = Family::Inet;
        let ifindex = 1;

        let ptr = ResourceRecord {
            name: "_http._tcp.local".to_string(),
            rclass: ClassCode::IN,
            cache_flush: false,
            ttl: 100,
            rdata: Rdata::PTR {
                name: "printer._http._tcp.local".to_string(),
            },
        };
        cache.upsert(
            CacheKey::new("_http._tcp.local", TypeCode::PTR, ClassCode::IN, family, ifindex),
            ptr.clone(),
            now,
        );

        let srv = ResourceRecord {
            name: "printer._http._tcp.local".to_string(),
            rclass: ClassCode::IN,
            cache_flush: false,
            ttl: 100,
            rdata: Rdata::SRV {
                priority: 0,
                weight: 0,
                port: 631,
                target: "printer.local".to_string(),
            },
        };
        cache.upsert(
            CacheKey::new(
                "printer._http._tcp.local",
                TypeCode::SRV,
                ClassCode::IN,
                family,
                ifindex,
            ),
            srv.clone(),
            now,
        );

        let a = a_record("printer.local", 100, (192, 168, 1, 50));
        cache.upsert(
            CacheKey::new("printer.local", TypeCode::A, ClassCode::IN, family, ifindex),
            a.clone(),
            now,
        );

        let found = cache.lookup(&[question("_http._tcp.local", TypeCode::PTR)], family, ifindex, now);
        assert!(found.contains(&ptr));
        assert!(found.contains(&srv));
        assert!(found.contains(&a));
    }
}
