//! In-memory transport used by tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Semaphore;

use crate::cache::{FilterField, FilterValue};

use super::client::{PageRequest, Transport};
use super::error::ApiError;
use super::types::{
  AvailableFilters, Click, CountryStat, Link, LinkId, LinkStats, NewLink, Page, Pagination,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
  ListLinks,
  CreateLink,
  GetLink,
  GetLinkStats,
  ListClicks,
}

#[derive(Default)]
struct FakeState {
  links: Vec<Link>,
  clicks: Vec<Click>,
  failures: HashMap<Endpoint, VecDeque<ApiError>>,
}

/// Server stand-in with the real service's ordering and pagination rules:
/// newest first, 1-based pages, distinct countries offered with clicks.
#[derive(Default)]
pub struct FakeTransport {
  state: Mutex<FakeState>,
  calls: Mutex<HashMap<Endpoint, Arc<AtomicU32>>>,
  endpoint_gates: Mutex<HashMap<Endpoint, Arc<Semaphore>>>,
  stats_gates: Mutex<HashMap<LinkId, Arc<Semaphore>>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Three links and a mix of bot/human clicks across US, DE and unknown
  pub fn seeded() -> Self {
    let fake = Self::new();
    {
      let mut state = fake.state.lock().unwrap();
      for id in 1..=3 {
        state.links.push(Link {
          id,
          code: format!("code{:02}", id),
          white_url: format!("https://white{}.example", id),
          black_url: format!("https://black{}.example", id),
          created_at: Utc.with_ymd_and_hms(2024, 1, id as u32, 12, 0, 0).unwrap(),
        });
      }
      let countries = ["US", "DE", "", "US", "US"];
      for (i, country) in countries.iter().enumerate() {
        let id = i as i64 + 1;
        state.clicks.push(Click {
          id,
          ip: format!("10.0.0.{}", id),
          user_agent: "Mozilla/5.0".to_string(),
          country: country.to_string(),
          is_bot: id % 2 == 0,
          link_id: 1,
          created_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, id as u32).unwrap(),
        });
      }
    }
    fake
  }

  pub fn calls(&self, endpoint: Endpoint) -> u32 {
    self.counter(endpoint).load(Ordering::SeqCst)
  }

  /// Make the next call to `endpoint` fail with `error`
  pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
    self
      .state
      .lock()
      .unwrap()
      .failures
      .entry(endpoint)
      .or_default()
      .push_back(error);
  }

  /// Hold calls to `endpoint` until the returned semaphore gets permits
  pub fn gate(&self, endpoint: Endpoint) -> Arc<Semaphore> {
    self
      .endpoint_gates
      .lock()
      .unwrap()
      .entry(endpoint)
      .or_insert_with(|| Arc::new(Semaphore::new(0)))
      .clone()
  }

  /// Hold stats responses for one link until released
  pub fn gate_stats(&self, id: LinkId) -> Arc<Semaphore> {
    self
      .stats_gates
      .lock()
      .unwrap()
      .entry(id)
      .or_insert_with(|| Arc::new(Semaphore::new(0)))
      .clone()
  }

  fn counter(&self, endpoint: Endpoint) -> Arc<AtomicU32> {
    self
      .calls
      .lock()
      .unwrap()
      .entry(endpoint)
      .or_default()
      .clone()
  }

  async fn enter(&self, endpoint: Endpoint) -> Result<(), ApiError> {
    self.counter(endpoint).fetch_add(1, Ordering::SeqCst);
    let gate = self.endpoint_gates.lock().unwrap().get(&endpoint).cloned();
    if let Some(gate) = gate {
      if let Ok(permit) = gate.acquire().await {
        permit.forget();
      }
    }
    let failure = self
      .state
      .lock()
      .unwrap()
      .failures
      .get_mut(&endpoint)
      .and_then(|q| q.pop_front());
    match failure {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  fn not_found() -> ApiError {
    ApiError::Server {
      status: 404,
      message: "Link not found".to_string(),
    }
  }
}

fn paginate<T: Clone>(rows: &[T], request: &PageRequest) -> Vec<T> {
  let offset = (request.page.saturating_sub(1) as usize) * request.page_size as usize;
  rows
    .iter()
    .skip(offset)
    .take(request.page_size as usize)
    .cloned()
    .collect()
}

fn pagination(total: usize, request: &PageRequest) -> Pagination {
  Pagination {
    total: total as u64,
    page: request.page,
    page_size: request.page_size,
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn list_links(&self, request: &PageRequest) -> Result<Page<Link>, ApiError> {
    self.enter(Endpoint::ListLinks).await?;
    let state = self.state.lock().unwrap();
    let mut links = state.links.clone();
    links.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(Page {
      data: paginate(&links, request),
      pagination: pagination(links.len(), request),
      filters: None,
    })
  }

  async fn create_link(&self, input: &NewLink) -> Result<Link, ApiError> {
    self.enter(Endpoint::CreateLink).await?;
    let mut state = self.state.lock().unwrap();
    let id = state.links.iter().map(|l| l.id).max().unwrap_or(0) + 1;
    let link = Link {
      id,
      code: format!("new{:03}", id),
      white_url: input.white_url.clone(),
      black_url: input.black_url.clone(),
      created_at: Utc::now(),
    };
    state.links.push(link.clone());
    Ok(link)
  }

  async fn get_link(&self, id: LinkId) -> Result<Link, ApiError> {
    self.enter(Endpoint::GetLink).await?;
    let state = self.state.lock().unwrap();
    state
      .links
      .iter()
      .find(|l| l.id == id)
      .cloned()
      .ok_or_else(Self::not_found)
  }

  async fn get_link_stats(&self, id: LinkId) -> Result<LinkStats, ApiError> {
    self.enter(Endpoint::GetLinkStats).await?;
    let gate = self.stats_gates.lock().unwrap().get(&id).cloned();
    if let Some(gate) = gate {
      if let Ok(permit) = gate.acquire().await {
        permit.forget();
      }
    }

    let state = self.state.lock().unwrap();
    if !state.links.iter().any(|l| l.id == id) {
      return Err(Self::not_found());
    }
    let clicks: Vec<&Click> = state.clicks.iter().filter(|c| c.link_id == id).collect();
    let mut by_country: HashMap<&str, u64> = HashMap::new();
    for click in &clicks {
      *by_country.entry(click.country.as_str()).or_default() += 1;
    }
    let mut country_stats: Vec<CountryStat> = by_country
      .into_iter()
      .map(|(country, count)| CountryStat {
        country: country.to_string(),
        count,
      })
      .collect();
    country_stats.sort_by(|a, b| b.count.cmp(&a.count).then(a.country.cmp(&b.country)));

    Ok(LinkStats {
      total_clicks: clicks.len() as u64,
      bot_clicks: clicks.iter().filter(|c| c.is_bot).count() as u64,
      country_stats,
    })
  }

  async fn list_clicks(&self, request: &PageRequest) -> Result<Page<Click>, ApiError> {
    self.enter(Endpoint::ListClicks).await?;
    let state = self.state.lock().unwrap();
    let country = match request.filters.get(FilterField::Country) {
      Some(FilterValue::Text(c)) => Some(c.clone()),
      _ => None,
    };
    let is_bot = match request.filters.get(FilterField::IsBot) {
      Some(FilterValue::Flag(b)) => Some(*b),
      _ => None,
    };

    let mut clicks: Vec<Click> = state
      .clicks
      .iter()
      .filter(|c| country.as_ref().map_or(true, |country| &c.country == country))
      .filter(|c| is_bot.map_or(true, |b| c.is_bot == b))
      .cloned()
      .collect();
    clicks.sort_by(|a, b| b.id.cmp(&a.id));

    let countries: BTreeSet<String> = state.clicks.iter().map(|c| c.country.clone()).collect();

    Ok(Page {
      data: paginate(&clicks, request),
      pagination: pagination(clicks.len(), request),
      filters: Some(AvailableFilters {
        countries: countries.into_iter().collect(),
      }),
    })
  }
}
