use std::collections::HashMap;

use crate::{
    now, Db, Error, LabelId, ObjectId, Page, Pagination, ScoreKey, Service, SortKey, Time, Uuid,
};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Label {
    pub id: LabelId,
    pub value: String,
    pub zone: String,
    pub sub_zone: String,
    pub create_time: Time,
    pub update_time: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewLabel {
    pub value: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub sub_zone: String,
}

impl NewLabel {
    pub fn into_label(self, id: LabelId, now: Time) -> Label {
        Label {
            id,
            value: self.value,
            zone: self.zone,
            sub_zone: self.sub_zone,
            create_time: now,
            update_time: now,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LabelPatch {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub sub_zone: Option<String>,
}

impl LabelPatch {
    pub fn apply(&self, l: &mut Label, now: Time) {
        if let Some(value) = &self.value {
            l.value = value.clone();
        }
        if let Some(zone) = &self.zone {
            l.zone = zone.clone();
        }
        if let Some(sub_zone) = &self.sub_zone {
            l.sub_zone = sub_zone.clone();
        }
        l.update_time = now;
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScoredLabel {
    #[serde(flatten)]
    pub label: Label,
    pub score: f64,
}

impl SortKey for ScoredLabel {
    type Key = ScoreKey;

    fn sort_key(&self) -> ScoreKey {
        ScoreKey {
            score: self.score,
            id: self.label.id.0,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SearchLabels {
    pub text: String,
    #[serde(default)]
    pub pagination: Pagination,
}

/// External object tagged with labels, eg. a post or a user
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LabelObject {
    pub id: ObjectId,
    pub object_type: i64,
    pub labels: Vec<LabelId>,
    pub create_time: Time,
    pub update_time: Time,
}

impl SortKey for LabelObject {
    type Key = Uuid;

    fn sort_key(&self) -> Uuid {
        self.id.0
    }
}

/// Creation and full replacement payload of a labelled object
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewLabelObject {
    pub id: ObjectId,
    pub object_type: i64,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

impl NewLabelObject {
    pub fn into_object(self, now: Time) -> LabelObject {
        LabelObject {
            id: self.id,
            object_type: self.object_type,
            labels: self.labels,
            create_time: now,
            update_time: now,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ObjectFilter {
    /// Only objects carrying this label
    #[serde(default)]
    pub label_id: Option<LabelId>,
    #[serde(default)]
    pub object_type: Option<i64>,
}

impl ObjectFilter {
    pub fn matches(&self, o: &LabelObject) -> bool {
        self.label_id.map_or(true, |l| o.labels.contains(&l))
            && self.object_type.map_or(true, |t| o.object_type == t)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListObjects {
    #[serde(default)]
    pub filter: ObjectFilter,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<D: Db> Service<D> {
    pub async fn create_label(&self, l: NewLabel) -> Result<Label, Error> {
        self.db.insert_label(l).await
    }

    pub async fn get_label(&self, id: LabelId) -> Result<Label, Error> {
        self.db.find_label(id).await
    }

    /// Looks up labels by id. The result follows the order of `ids`, with
    /// `None` for unknown labels.
    pub async fn get_labels_in_batch(&self, ids: &[LabelId]) -> Result<Vec<Option<Label>>, Error> {
        let found = self
            .db
            .find_labels(ids)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect::<HashMap<_, _>>();
        Ok(ids.iter().map(|id| found.get(id).cloned()).collect())
    }

    pub async fn update_label(&self, id: LabelId, patch: &LabelPatch) -> Result<(), Error> {
        self.db.update_label(id, patch).await
    }

    pub async fn delete_label(&self, id: LabelId) -> Result<(), Error> {
        match self.db.delete_label(id).await? {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }

    pub async fn search_labels(
        &self,
        text: &str,
        p: &Pagination,
    ) -> Result<Page<ScoredLabel>, Error> {
        let window = p.score_window()?;
        let (items, total) = self.db.search_labels(text, &window).await?;
        Ok(p.finish(items, total))
    }

    pub async fn create_object(&self, o: NewLabelObject) -> Result<(), Error> {
        self.create_objects(vec![o]).await
    }

    /// Creates all the objects or none of them
    pub async fn create_objects(&self, objects: Vec<NewLabelObject>) -> Result<(), Error> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = objects.iter().find(|o| !seen.insert(o.id)) {
            return Err(Error::IllegalOperation(format!(
                "object {} is listed twice",
                dup.id
            )));
        }
        let n = objects.len();
        let time = now();
        self.db
            .insert_objects(objects.into_iter().map(|o| o.into_object(time)).collect())
            .await?;
        tracing::debug!(objects = n, "created labelled objects");
        Ok(())
    }

    /// Replaces the type and labels of an existing object
    pub async fn update_object(&self, o: &NewLabelObject) -> Result<(), Error> {
        self.db.update_object(o).await
    }

    pub async fn delete_object(&self, id: ObjectId) -> Result<(), Error> {
        match self.db.delete_object(id).await? {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }

    /// Lists the ids of the objects matching `filter`, greatest id first
    pub async fn get_objects(
        &self,
        filter: &ObjectFilter,
        p: &Pagination,
    ) -> Result<Page<ObjectId>, Error> {
        let window = p.id_window()?;
        let (items, total) = futures::try_join!(
            self.db.find_objects(filter, &window),
            self.db.count_objects(filter),
        )?;
        Ok(p.finish(items, total).map(|o| o.id))
    }
}
