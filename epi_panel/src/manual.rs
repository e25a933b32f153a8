/*!

This is the long-form manual for `epi_panel` and `covprog`.

## Input formats

Each entity class (`country`, `state`, `county`) reads from one provider:
* `jhu` Johns Hopkins CSSE global time series (countries)
* `owid` Our World in Data country table (countries)
* `nyt` New York Times US tables (states and counties)

Any class may add a `vaccinations` table.

### `jhu`

Two wide CSV files, one for confirmed cases and one for deaths. Each row is a
country or one of its provinces, each date is a column, values are cumulative:

```text
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20
,France,46.2,2.2,0,2
Reunion,France,-21.1,55.5,0,0
```

Rows are mapped to an ISO3 code through the country information table
(`country,region,country_code,population`). Several rows mapping to the same
code are added together. Rows with no mapping are dropped.

### `owid`

One long CSV file with cumulative totals and the population repeated on every
row:

```text
iso_code,date,total_cases,total_deaths,population
FRA,2020-03-01,130,2,65273512
```

Aggregates such as `OWID_WRL` are not countries and are dropped.

### `nyt`

One long CSV file with cumulative totals per FIPS code:

```text
date,county,state,fips,cases,deaths
2020-03-01,King,Washington,53033,14,
```

The `county` column only exists in the county table. Codes are joined to the
population table whatever their padding (`6037`, `06037` and `6037.0` are the
same county). New York City has no FIPS code in the source: it receives the
code `NYC` and a population of 8,398,748.

### Vaccinations

A long CSV file of doses administered per day:

```text
iso_code,date,daily_vaccinations
ISR,2020-12-20,7000
```

Missing days keep the last total. Doses are divided by
[`DOSES_PER_PERSON`](crate::DOSES_PER_PERSON) to approximate people vaccinated.

## Populations

Population tables are CSV or Excel files. When a table holds several rows for
one identifier:
 - the country information table adds them (rows are sub-regions),
 - every other table keeps the first one.

Empty or negative populations are unknown: the per-capita columns of that
entity are empty.

## Columns

For each metric (`cases`, `deaths`, `vax`) a panel carries:

| column        | content                          |
|---------------|----------------------------------|
| `cases_cum`   | running total                    |
| `cases`       | new cases (difference of totals) |
| `cases_cum_pc`| running total per person         |
| `cases_pc`    | new cases per person             |

## Configuration

`covprog` reads a JSON file describing where the tables are:

```json
{
  "dataDirectory": "../data",
  "state": {
    "provider": "nyt",
    "filePath": "nyt/us-states.csv",
    "population": { "filePath": "pop/state-populations.csv", "populationColumn": "2018" }
  }
}
```

Deviations from the raw sources:
 - `populationColumn` (string, optional): the column holding the population.
 Defaults to `population` (countries), `2018` (states) and `pop18` (counties).

 - `excelWorksheetName` (string, optional): for Excel population tables, the
 name of the worksheet. The first worksheet is used otherwise.

 - `keyColumn`, `dateColumn`, `dosesColumn` (strings, optional): the columns of
 a vaccination table.

 */
