/*!
# Volunteer Tracker

A small service for logging volunteer hours, built in Rust.

## Overview

Volunteers are tracked with an optional email and an hour goal. Each logged
event records what was done, where, on which day and for how long (`H:MM`).
An admin account guards destructive and bulk operations: deleting events,
exports, imports and spreadsheet sync.

## Architecture

### HTTP Layer
- **Technologies**: axum, tower-http
- A JSON API under `/api` and the built web client served for every other
  path, so client-side routes survive a reload.

### Data Layer
- An in-memory store behind the [`storage::Storage`] trait
- Snapshots written as gzip-compressed bincode after every change

### Sync Layer
- One-way push that mirrors every record into a Google spreadsheet
- Pull that adds rows entered on the spreadsheet side
- Replay of writes the web client queued while offline

## Modules

- **hours**: `H:MM` durations, totals and goal progress
- **model**: record types and request payloads with validation
- **storage**: the data store seam and the snapshot-backed store
- **saving**: snapshot persistence with compression
- **auth**: admin account, sessions and the admin gate
- **api**: volunteer, event, export and sync handlers
- **workbook**: spreadsheet layout shared by XLSX export and sync
- **export** / **import**: CSV and XLSX out, CSV in
- **reconcile**: matching incoming rows against stored events
- **sheets**: the spreadsheet client and an in-process stand-in
- **sync**: push, pull, status and auto-sync
- **replay**: the offline operation queue
- **app**: routing, middleware and server startup
- **cli**: the command-line front end
- **config** / **logging** / **error** / **extract**: the ambient plumbing
*/

pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod hours;
pub mod import;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod replay;
pub mod saving;
pub mod sheets;
pub mod storage;
pub mod sync;
pub mod workbook;

pub use error::{Error, Result};
