use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use server_api::{
    auth::DEFAULT_SESSION_TTL_SECONDS, create_project, list_groups, move_group,
    move_within_group, patch_image, ApiContext, ContentCache, SessionKeys,
};
use shared::{
    domain::{GroupView, ImageId, LayoutKind, ProjectId},
    error::ApiError,
    protocol::{CreateProjectRequest, Direction, ImagePatchRequest, ReorderResponse},
};
use storage::{LocalBlobStore, Storage};

#[derive(Parser, Debug)]
#[command(name = "gallery-tools")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/gallery.db")]
    database_url: String,
    #[arg(long, env = "APP__MEDIA_ROOT", default_value = "./data/media")]
    media_root: String,
    #[arg(
        long,
        env = "APP__MEDIA_PUBLIC_BASE",
        default_value = "http://127.0.0.1:8443/media/"
    )]
    media_public_base: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateProject {
        slug: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    ListGroups {
        project_id: i64,
    },
    MoveGroup {
        image_id: i64,
        direction: MoveDirection,
    },
    MoveWithinGroup {
        image_id: i64,
        direction: MoveDirection,
    },
    /// Detach one image from its group, making it solo.
    DissolveImage {
        image_id: i64,
    },
    MintToken {
        subject: String,
        #[arg(long, env = "APP__AUTH_JWT_SECRET", default_value = "devsecret")]
        secret: String,
        #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECONDS)]
        ttl_seconds: i64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(value: MoveDirection) -> Self {
        match value {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::MintToken {
        subject,
        secret,
        ttl_seconds,
    } = &cli.command
    {
        let token = SessionKeys::new(secret.as_str(), *ttl_seconds)?.mint(subject)?;
        println!("{token}");
        return Ok(());
    }

    let storage = Storage::new(&cli.database_url).await?;
    let blobs = LocalBlobStore::new(&cli.media_root, &cli.media_public_base)?;
    let ctx = ApiContext::new(storage, blobs, ContentCache::default());

    match cli.command {
        Command::CreateProject {
            slug,
            title,
            description,
        } => {
            let project = create_project(
                &ctx,
                &CreateProjectRequest {
                    slug,
                    title,
                    description,
                },
            )
            .await
            .map_err(api_error)?;
            println!("created project_id={} slug={}", project.id, project.slug);
        }
        Command::ListGroups { project_id } => {
            let groups = list_groups(&ctx, ProjectId(project_id))
                .await
                .map_err(api_error)?;
            print_groups(&groups);
        }
        Command::MoveGroup {
            image_id,
            direction,
        } => {
            let response = move_group(&ctx, ImageId(image_id), direction.into())
                .await
                .map_err(api_error)?;
            print_reorder(&response);
        }
        Command::MoveWithinGroup {
            image_id,
            direction,
        } => {
            let response = move_within_group(&ctx, ImageId(image_id), direction.into())
                .await
                .map_err(api_error)?;
            print_reorder(&response);
        }
        Command::DissolveImage { image_id } => {
            let image = patch_image(
                &ctx,
                ImageId(image_id),
                ImagePatchRequest {
                    layout_kind: Some(LayoutKind::Solo),
                    ..ImagePatchRequest::default()
                },
            )
            .await
            .map_err(api_error)?;
            println!("image {} is now solo at order_index={}", image.id, image.order_index);
        }
        Command::MintToken { .. } => {}
    }

    Ok(())
}

fn print_groups(groups: &[GroupView]) {
    for group in groups {
        println!(
            "{:>4}  {:<40} {:<6} {} member(s)",
            group.order_index,
            group.group_key.to_string(),
            group.layout_kind().as_str(),
            group.members.len()
        );
        for member in &group.members {
            let hidden = if member.is_active { "" } else { " (hidden)" };
            println!(
                "        #{} [{}] {}{hidden}",
                member.id, member.order_index, member.alt_text_primary
            );
        }
    }
}

fn print_reorder(response: &ReorderResponse) {
    if response.changed {
        println!("updated {} row(s)", response.updated_rows);
    } else {
        println!("already at the boundary; nothing changed");
    }
}

fn api_error(error: ApiError) -> anyhow::Error {
    anyhow!("{:?}: {}", error.code, error.message)
}
