use agora_api::{
    from_millis, CommentFilter, Direction, ObjectFilter, RelationFilter, Time, Uuid, Window,
};
use sqlx::{postgres::PgArguments, query::Query, Postgres};

pub enum Bind {
    I16(i16),
    I64(i64),
    Uuid(Uuid),
    Uuids(Vec<Uuid>),
    String(String),
    Time(Time),
}

pub struct Sql {
    pub where_clause: String,
    pub binds: Vec<Bind>,
}

impl Default for Sql {
    fn default() -> Sql {
        Sql {
            where_clause: String::from("true"),
            binds: Vec::new(),
        }
    }
}

impl Sql {
    /// Adds a Bind, returning the index that should be used to refer to it
    pub fn add_bind(&mut self, b: Bind) -> usize {
        self.binds.push(b);
        self.binds.len()
    }

    fn and_eq(&mut self, column: &str, b: Bind) {
        let idx = self.add_bind(b);
        self.where_clause
            .push_str(&format!(" AND {column} = ${idx}"));
    }

    /// Restricts to the rows admitted by `window`, comparing `column` to the
    /// bound, and returns the ORDER BY / LIMIT / OFFSET suffix
    pub fn window<K>(&mut self, column: &str, window: &Window<K>, bound: Option<Bind>) -> String {
        let (op, order) = match window.direction {
            Direction::Forward => ("<", "DESC"),
            Direction::Backward => (">", "ASC"),
        };
        if let Some(b) = bound {
            let idx = self.add_bind(b);
            self.where_clause
                .push_str(&format!(" AND {column} {op} ${idx}"));
        }
        format!(
            "ORDER BY {column} {order} LIMIT {} OFFSET {}",
            window.limit, window.offset
        )
    }
}

/// Millisecond bound of a window turned into a timestamp
pub enum TimeBound {
    Unbounded,
    Bound(Bind),
    /// The bound lies beyond representable times on the side that excludes
    /// every row
    Empty,
}

pub fn time_bound(window: &Window<i64>) -> TimeBound {
    match window.bound {
        None => TimeBound::Unbounded,
        Some(ms) => match from_millis(ms) {
            Some(t) => TimeBound::Bound(Bind::Time(t)),
            None if window.admits(&0) => TimeBound::Unbounded,
            None => TimeBound::Empty,
        },
    }
}

pub fn comment_filter(f: &CommentFilter) -> Sql {
    let mut res = Sql::default();
    if let Some(u) = f.user_id {
        res.and_eq("user_id", Bind::Uuid(u.0));
    }
    if let Some(u) = f.at_user_id {
        res.and_eq("at_user_id", Bind::Uuid(u.0));
    }
    if let Some(s) = f.subject_id {
        res.and_eq("subject_id", Bind::Uuid(s.0));
    }
    if let Some(r) = f.root_id {
        res.and_eq("root_id", Bind::Uuid(r));
    }
    if let Some(father) = f.father_id {
        res.and_eq("father_id", Bind::Uuid(father));
    }
    if let Some(ids) = &f.ids {
        let idx = res.add_bind(Bind::Uuids(ids.iter().map(|i| i.0).collect()));
        res.where_clause.push_str(&format!(" AND id = ANY(${idx})"));
    }
    if let Some(s) = f.state {
        res.and_eq("state", Bind::I16(s.to_i16()));
    }
    if let Some(a) = f.attrs {
        res.and_eq("attrs", Bind::I16(a.to_i16()));
    }
    res
}

pub fn object_filter(f: &ObjectFilter) -> Sql {
    let mut res = Sql::default();
    if let Some(l) = f.label_id {
        let idx = res.add_bind(Bind::Uuid(l.0));
        res.where_clause.push_str(&format!(" AND ${idx} = ANY(labels)"));
    }
    if let Some(t) = f.object_type {
        res.and_eq("object_type", Bind::I64(t));
    }
    res
}

pub fn relation_filter(f: &RelationFilter) -> Sql {
    let mut res = Sql::default();
    match f {
        RelationFilter::From {
            from,
            to_type,
            relation_type,
        } => {
            res.and_eq("from_type", Bind::I64(from.kind));
            res.and_eq("from_id", Bind::String(from.id.clone()));
            res.and_eq("to_type", Bind::I64(*to_type));
            res.and_eq("relation_type", Bind::I64(*relation_type));
        }
        RelationFilter::To {
            from_type,
            to,
            relation_type,
        } => {
            res.and_eq("to_type", Bind::I64(to.kind));
            res.and_eq("to_id", Bind::String(to.id.clone()));
            res.and_eq("from_type", Bind::I64(*from_type));
            res.and_eq("relation_type", Bind::I64(*relation_type));
        }
    }
    res
}

pub fn bind<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    binds: &[Bind],
) -> Query<'q, Postgres, PgArguments> {
    for b in binds {
        q = match b {
            Bind::I16(v) => q.bind(*v),
            Bind::I64(v) => q.bind(*v),
            Bind::Uuid(v) => q.bind(*v),
            Bind::Uuids(v) => q.bind(v.clone()),
            Bind::String(v) => q.bind(v.clone()),
            Bind::Time(v) => q.bind(*v),
        };
    }
    q
}
