//! Articles demo.
//!
//! ```text
//! curl localhost:8080/articles/world/7
//! curl -d newname=dude localhost:8080/articles/world/7
//! curl -X POST -H 'content-type: application/json' -d '{"title":"hi"}' localhost:8080/articles/world/
//! ```

use std::time::Duration;

use serde::Deserialize;
use tether::prelude::*;
use tether::runtime::config::load_config;
use tether::runtime::logging;
use tether::runtime::prelude::info;

#[derive(Debug, Deserialize, FormSchema)]
struct ArticleQuery {
    category: String,
    id: i64,
}

#[derive(Debug, Deserialize, FormSchema)]
struct Rename {
    #[form(required)]
    newname: String,
}

#[derive(Debug, Deserialize)]
struct NewArticle {
    title: String,
}

async fn article(Get(q): Get<ArticleQuery>, Post(rename): Post<Rename>) -> Response {
    match rename {
        Some(r) => Response::format(format_args!("I like post. NewName={}", r.newname)),
        None => Response::format(format_args!("Hello {}. Id={}", q.category, q.id)),
    }
}

async fn create(req: Request, Json(new): Json<NewArticle>) -> Result<Response, String> {
    let category = req.path_var("category").unwrap_or_default();
    if new.title.trim().is_empty() {
        return Err("title must not be empty".to_owned());
    }
    info!(category, title = %new.title, "article created");
    Ok(Response::created(format!("{category}/{}", new.title)))
}

fn plain_errors(code: StatusCode, message: &str, _: &Request) -> Response {
    Response::string(format!("{}: {message}\n", code.as_u16())).override_status(code)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    logging::init_from_config(&config.logging);

    let timeout = with_context_wrapper(|ctx: Context| {
        let (ctx, cancel) = ctx.with_timeout(Duration::from_secs(10));
        (ctx, Some(cancel))
    });

    Server::from_config(&config)
        .handle("/articles/{category}/{id}", article, [])
        .handle(
            "/articles/{category}/",
            create,
            [timeout, with_error_handler(plain_errors)],
        )
        .serve()
        .await?;

    Ok(())
}
