use agora_api::{
    Attrs, CommentFilter, CommentId, LabelId, ListComments, ListObjects, NewLabel,
    NewLabelObject, NewSubject, Node, ObjectFilter, ObjectId, Pagination, SearchLabels, SetAttrs,
    SubjectId, UserId,
};
use anyhow::{anyhow, Context};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "AGORA_HOST")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a subject
    CreateSubject {
        /// Owner of the subject
        user: UserId,

        /// Reuse the identifier of the discussed object
        #[structopt(long)]
        id: Option<SubjectId>,
    },

    /// Display a subject with its counters
    GetSubject { id: SubjectId },

    /// Delete a subject and announce it
    DeleteSubject { id: SubjectId },

    /// List the latest comments of a subject
    ListComments {
        subject: SubjectId,

        #[structopt(long)]
        limit: Option<u32>,

        /// Token returned by a previous listing
        #[structopt(long)]
        token: Option<String>,

        #[structopt(long)]
        backward: bool,
    },

    /// Set the attributes of a comment: none, highlighted, pinned or
    /// pinned-highlighted
    SetAttrs {
        subject: SubjectId,
        comment: CommentId,
        attrs: String,
    },

    /// Delete comments, keeping the subject counters in sync
    DeleteComments { ids: Vec<CommentId> },

    /// Create a label
    CreateLabel {
        value: String,

        #[structopt(long, default_value = "")]
        zone: String,

        #[structopt(long, default_value = "")]
        sub_zone: String,
    },

    /// Search labels by text
    SearchLabels {
        text: String,

        #[structopt(long)]
        limit: Option<u32>,
    },

    /// Fetch several labels at once
    GetLabels { ids: Vec<LabelId> },

    /// Create an object with its labels, or replace the labels of an existing
    /// one with `--update`
    TagObject {
        id: ObjectId,
        object_type: i64,
        labels: Vec<LabelId>,

        #[structopt(long)]
        update: bool,
    },

    /// List the objects carrying a label
    ListObjects {
        #[structopt(long)]
        label: Option<LabelId>,

        #[structopt(long)]
        object_type: Option<i64>,

        #[structopt(long)]
        limit: Option<u32>,

        #[structopt(long)]
        token: Option<String>,
    },

    DeleteObject { id: ObjectId },

    /// Delete a node and every relation touching it
    DeleteNode { kind: i64, id: String },
}

fn parse_attrs(s: &str) -> anyhow::Result<Attrs> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .with_context(|| format!("parsing {s:?} as comment attributes"))
}

async fn send(req: reqwest::RequestBuilder) -> anyhow::Result<serde_json::Value> {
    let resp = req.send().await.context("sending request")?;
    let status = resp.status();
    let body = resp.bytes().await.context("reading response body")?;
    if !status.is_success() {
        let err = agora_api::Error::parse(&body)
            .with_context(|| format!("server answered {status} with unparseable body"))?;
        return Err(anyhow!(err).context(format!("server answered {status}")));
    }
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&body).context("parsing response body")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();
    let url = |path: &str| format!("{}/api/{path}", opt.host.trim_end_matches('/'));

    let res = match opt.cmd {
        Command::CreateSubject { user, id } => {
            let subject = NewSubject {
                id,
                ..NewSubject::new(user)
            };
            send(client.post(url("subjects")).json(&subject)).await?
        }
        Command::GetSubject { id } => send(client.get(url(&format!("subjects/{id}")))).await?,
        Command::DeleteSubject { id } => {
            send(client.delete(url(&format!("subjects/{id}")))).await?
        }
        Command::ListComments {
            subject,
            limit,
            token,
            backward,
        } => {
            let query = ListComments {
                filter: CommentFilter {
                    subject_id: Some(subject),
                    ..CommentFilter::default()
                },
                pagination: Pagination {
                    limit,
                    offset: None,
                    backward,
                    token,
                },
            };
            send(client.post(url("comments/list")).json(&query)).await?
        }
        Command::SetAttrs {
            subject,
            comment,
            attrs,
        } => {
            let data = SetAttrs {
                attrs: parse_attrs(&attrs)?,
            };
            send(
                client
                    .put(url(&format!("subjects/{subject}/comments/{comment}/attrs")))
                    .json(&data),
            )
            .await?
        }
        Command::DeleteComments { ids } => {
            send(client.post(url("comments/delete")).json(&ids)).await?
        }
        Command::CreateLabel {
            value,
            zone,
            sub_zone,
        } => {
            let label = NewLabel {
                value,
                zone,
                sub_zone,
            };
            send(client.post(url("labels")).json(&label)).await?
        }
        Command::SearchLabels { text, limit } => {
            let query = SearchLabels {
                text,
                pagination: Pagination {
                    limit,
                    ..Pagination::default()
                },
            };
            send(client.post(url("labels/search")).json(&query)).await?
        }
        Command::GetLabels { ids } => send(client.post(url("labels/batch")).json(&ids)).await?,
        Command::TagObject {
            id,
            object_type,
            labels,
            update,
        } => {
            let object = NewLabelObject {
                id,
                object_type,
                labels,
            };
            let req = match update {
                true => client.put(url("objects")),
                false => client.post(url("objects")),
            };
            send(req.json(&object)).await?
        }
        Command::ListObjects {
            label,
            object_type,
            limit,
            token,
        } => {
            let query = ListObjects {
                filter: ObjectFilter {
                    label_id: label,
                    object_type,
                },
                pagination: Pagination {
                    limit,
                    token,
                    ..Pagination::default()
                },
            };
            send(client.post(url("objects/list")).json(&query)).await?
        }
        Command::DeleteObject { id } => {
            send(client.delete(url(&format!("objects/{id}")))).await?
        }
        Command::DeleteNode { kind, id } => {
            send(client.post(url("nodes/delete")).json(&Node::new(kind, id))).await?
        }
    };

    if !res.is_null() {
        println!("{}", serde_json::to_string_pretty(&res)?);
    }
    Ok(())
}
