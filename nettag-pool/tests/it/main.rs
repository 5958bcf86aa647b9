mod concurrency;
mod link;
