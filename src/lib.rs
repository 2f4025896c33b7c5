pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod mapper;
pub mod models;
pub mod repository;
pub mod resource;
pub mod routes;
pub mod search;
pub mod store;
pub mod tmdb;
