use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(integer(Movies::Id).primary_key())
                    .col(string(Movies::Title))
                    .col(text(Movies::Overview))
                    .col(string_null(Movies::PosterPath))
                    .col(string_null(Movies::BackdropPath))
                    .col(string_null(Movies::ReleaseDate))
                    .col(double(Movies::VoteAverage))
                    .col(integer(Movies::VoteCount))
                    .col(double(Movies::Popularity))
                    .col(boolean(Movies::IsBookmarked).default(false))
                    .col(string(Movies::Category))
                    .col(integer_null(Movies::Runtime))
                    .col(string_null(Movies::Tagline))
                    .col(string_null(Movies::Genres))
                    .col(big_integer(Movies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Id,
    Title,
    Overview,
    PosterPath,
    BackdropPath,
    ReleaseDate,
    VoteAverage,
    VoteCount,
    Popularity,
    IsBookmarked,
    Category,
    Runtime,
    Tagline,
    Genres,
    UpdatedAt,
}
