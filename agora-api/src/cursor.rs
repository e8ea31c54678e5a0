use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Uuid};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Direction {
    /// Towards older items, ie. decreasing sort keys
    Forward,

    /// Towards newer items, ie. increasing sort keys
    Backward,
}

/// Paging options as sent by clients
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub backward: bool,
    #[serde(default)]
    pub token: Option<String>,
}

impl Pagination {
    pub fn first(limit: u32) -> Pagination {
        Pagination {
            limit: Some(limit),
            ..Pagination::default()
        }
    }

    /// Options fetching the page following `page` in the same direction
    pub fn next<T>(&self, page: &Page<T>) -> Pagination {
        Pagination {
            token: page.token.clone(),
            offset: None,
            ..self.clone()
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn direction(&self) -> Direction {
        if self.backward {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    /// Resolves the token into a bound on sort times. Without a token, forward
    /// paging starts from the newest item and backward paging from the oldest.
    pub fn time_window(&self) -> Result<Window<i64>, Error> {
        let direction = self.direction();
        let bound = match &self.token {
            Some(t) => Cursor::<i64>::decode(t)?.bound(direction),
            None => match direction {
                Direction::Forward => i64::MAX,
                Direction::Backward => 0,
            },
        };
        Ok(self.window(Some(bound)))
    }

    pub fn score_window(&self) -> Result<Window<ScoreKey>, Error> {
        self.keyed_window()
    }

    /// Window over items ordered by identifier, greatest first
    pub fn id_window(&self) -> Result<Window<Uuid>, Error> {
        self.keyed_window()
    }

    fn keyed_window<K: Clone + Serialize + DeserializeOwned>(&self) -> Result<Window<K>, Error> {
        let direction = self.direction();
        let bound = self
            .token
            .as_ref()
            .map(|t| Cursor::<K>::decode(t).map(|c| c.bound(direction)))
            .transpose()?;
        Ok(self.window(bound))
    }

    fn window<K>(&self, bound: Option<K>) -> Window<K> {
        Window {
            bound,
            direction: self.direction(),
            limit: self.limit(),
            offset: self.offset(),
        }
    }

    /// Turns items fetched through `time_window` or `score_window` into the
    /// page returned to clients
    pub fn finish<T: SortKey>(&self, mut items: Vec<T>, total: u64) -> Page<T> {
        if self.backward {
            items.reverse();
        }
        let token = match Cursor::from_page(&items) {
            Some(c) => Some(c.encode()),
            None => self.token.clone(),
        };
        Page {
            items,
            total,
            token,
        }
    }
}

/// Resolved query for one page of items
#[derive(Clone, Debug, PartialEq)]
pub struct Window<K> {
    /// Exclusive bound on the sort key, absent when any key is admitted
    pub bound: Option<K>,
    pub direction: Direction,
    pub limit: u32,
    pub offset: u32,
}

impl<K: PartialOrd> Window<K> {
    pub fn admits(&self, key: &K) -> bool {
        match (&self.bound, self.direction) {
            (None, _) => true,
            (Some(b), Direction::Forward) => key < b,
            (Some(b), Direction::Backward) => key > b,
        }
    }

    /// Applies the window to an unordered set of items, returning them in
    /// query order: descending keys going forward, ascending going backward
    pub fn select<T: SortKey<Key = K>>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let mut res = items
            .into_iter()
            .filter(|i| self.admits(&i.sort_key()))
            .collect::<Vec<_>>();
        res.sort_by(|a, b| {
            let ord = a
                .sort_key()
                .partial_cmp(&b.sort_key())
                .unwrap_or(std::cmp::Ordering::Equal);
            match self.direction {
                Direction::Forward => ord.reverse(),
                Direction::Backward => ord,
            }
        });
        res.into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

pub trait SortKey {
    type Key: Clone + PartialOrd + Serialize + DeserializeOwned;

    fn sort_key(&self) -> Self::Key;
}

/// Search-after key for relevance-ordered results
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct ScoreKey {
    pub score: f64,
    pub id: Uuid,
}

/// Bounds of a page, newest-first: `first` is the largest key and `last` the
/// smallest one
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Cursor<K> {
    pub first: K,
    pub last: K,
}

impl<K: Clone + Serialize + DeserializeOwned> Cursor<K> {
    pub fn from_page<T: SortKey<Key = K>>(items: &[T]) -> Option<Cursor<K>> {
        Some(Cursor {
            first: items.first()?.sort_key(),
            last: items.last()?.sort_key(),
        })
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("serializing cursor");
        base64::encode_config(json, base64::URL_SAFE_NO_PAD)
    }

    pub fn decode(token: &str) -> Result<Cursor<K>, Error> {
        let json =
            base64::decode_config(token, base64::URL_SAFE_NO_PAD).map_err(|_| Error::InvalidCursor)?;
        serde_json::from_slice(&json).map_err(|_| Error::InvalidCursor)
    }

    /// Key to continue from when paging in `direction`
    pub fn bound(self, direction: Direction) -> K {
        match direction {
            Direction::Forward => self.last,
            Direction::Backward => self.first,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub token: Option<String>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            token: self.token,
        }
    }
}
